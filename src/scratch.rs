//! Finding a directory the process can both write to and execute from.
//!
//! Extraction targets are probed, never assumed: home directories can
//! be read-only, temp can be mounted noexec, and sandboxes lie. Every
//! probe in this module returns a boolean or an `Option` instead of an
//! error; failures are logged at debug level and the caller moves on to
//! the next candidate.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of the namespaced directory under the system temp root.
const TEMP_NAMESPACE: &str = "native-loader-";

/// Namespaced directory under the user home.
const HOME_DIR_NAME: &str = ".native-loader";

/// Environment marker present inside the macOS app sandbox.
const SANDBOX_MARKER: &str = "APP_SANDBOX_CONTAINER_ID";

/// First location from the candidate chain that passes the
/// write-and-execute probe, or `None` if every candidate fails and no
/// sandbox marker is present.
///
/// Candidate order: namespaced system temp, a fresh OS-issued temp
/// directory, the user home, then `.temp/` relative to the current
/// directory. Inside the macOS sandbox the probe fails even where
/// writes are allowed, so the first candidate is returned unprobed as
/// a last resort.
pub fn find_writable_file(dir_name: &str, file_name: &str) -> Option<PathBuf> {
    let ideal = temp_candidate(dir_name).join(file_name);
    if can_write(&ideal) {
        return Some(ideal);
    }

    if let Some(dir) = os_temp_candidate(dir_name) {
        let file = dir.join(file_name);
        if can_write(&file) {
            return Some(file);
        }
    }

    if let Some(dir) = home_candidate(dir_name) {
        let file = dir.join(file_name);
        if can_write(&file) {
            return Some(file);
        }
    }

    let relative = relative_candidate(dir_name).join(file_name);
    if can_write(&relative) {
        return Some(relative);
    }

    if env::var_os(SANDBOX_MARKER).is_some() {
        tracing::debug!(
            "all probes failed but {} is set, assuming {} is writable",
            SANDBOX_MARKER,
            ideal.display()
        );
        return Some(ideal);
    }

    None
}

/// `<system temp>/native-loader-<user>/<dir_name>`.
pub(crate) fn temp_candidate(dir_name: &str) -> PathBuf {
    let user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    env::temp_dir()
        .join(format!("{}{}", TEMP_NAMESPACE, user))
        .join(dir_name)
}

/// A freshly issued OS temp directory, kept on disk for the caller.
pub(crate) fn os_temp_candidate(dir_name: &str) -> Option<PathBuf> {
    match tempfile::Builder::new().prefix(dir_name).tempdir() {
        Ok(dir) => Some(dir.keep()),
        Err(err) => {
            tracing::debug!("could not create an OS temp directory: {}", err);
            None
        }
    }
}

/// `<home>/.native-loader/<dir_name>`, if a home directory exists.
pub(crate) fn home_candidate(dir_name: &str) -> Option<PathBuf> {
    let dirs = directories::UserDirs::new()?;
    Some(dirs.home_dir().join(HOME_DIR_NAME).join(dir_name))
}

/// `.temp/<dir_name>` relative to the current directory.
pub(crate) fn relative_candidate(dir_name: &str) -> PathBuf {
    PathBuf::from(".temp").join(dir_name)
}

/// Whether `target` can be created (or already exists) as a writable,
/// executable file. Never propagates an error.
pub fn can_write(target: &Path) -> bool {
    let Some(parent) = target.parent() else {
        return false;
    };

    if target.exists() {
        if !file_writable(target) || !ensure_executable(target) {
            return false;
        }
        // Don't overwrite the existing file just to probe the
        // directory; write a randomly-named sibling instead.
        match tempfile::NamedTempFile::new_in(parent) {
            Ok(probe) => ensure_executable(probe.path()),
            Err(err) => {
                tracing::debug!("write probe in {} failed: {}", parent.display(), err);
                false
            }
        }
    } else {
        if fs::create_dir_all(parent).is_err() || !parent.is_dir() {
            return false;
        }
        match fs::File::create(target) {
            Ok(file) => {
                drop(file);
                let executable = ensure_executable(target);
                let _ = fs::remove_file(target);
                executable
            }
            Err(err) => {
                tracing::debug!("probe create of {} failed: {}", target.display(), err);
                false
            }
        }
    }
}

fn file_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| !meta.permissions().readonly())
        .unwrap_or(false)
}

/// Whether `path` is executable, setting the executable bits if needed.
#[cfg(unix)]
pub fn ensure_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    let mut permissions = metadata.permissions();
    if permissions.mode() & 0o111 != 0 {
        return true;
    }

    permissions.set_mode(permissions.mode() | 0o111);
    match fs::set_permissions(path, permissions) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!("cannot set executable bit on {}: {}", path.display(), err);
            false
        }
    }
}

/// On Windows the execute permission is not a file-mode bit.
#[cfg(not(unix))]
pub fn ensure_executable(_path: &Path) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_can_write_fresh_file() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("sub/dir/probe.so");

        assert!(can_write(&target));
        // The probe file itself must not be left behind.
        assert!(!target.exists());
        // Parent directories are allowed to remain.
        assert!(target.parent().unwrap().is_dir());
    }

    #[test]
    fn test_can_write_existing_file() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("existing.so");
        std::fs::write(&target, b"bytes").unwrap();

        assert!(can_write(&target));
        // Probing must not clobber the existing content.
        assert_eq!(std::fs::read(&target).unwrap(), b"bytes");
    }

    #[cfg(unix)]
    #[test]
    fn test_can_write_rejects_readonly_file() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("frozen.so");
        std::fs::write(&target, b"bytes").unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o444)).unwrap();

        // The check is permission-bit based, so it holds even for root.
        assert!(!can_write(&target));
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_executable_sets_bits() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("lib.so");
        std::fs::write(&target, b"bytes").unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(ensure_executable(&target));
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
    }

    #[test]
    fn test_find_writable_file_prefers_namespaced_temp() {
        // In any environment where the system temp root is usable, the
        // first candidate must win.
        let found = find_writable_file("scratch-test-dir", "probe.so");
        let Some(path) = found else {
            // Nothing writable at all; acceptable in exotic sandboxes.
            return;
        };
        if can_write(&temp_candidate("scratch-test-dir").join("probe.so")) {
            assert!(path.starts_with(env::temp_dir()));
        }
    }

    #[test]
    fn test_candidate_paths_are_namespaced() {
        let temp = temp_candidate("abc123");
        assert!(temp
            .to_string_lossy()
            .contains(TEMP_NAMESPACE));
        assert!(temp.ends_with("abc123"));

        let relative = relative_candidate("abc123");
        assert_eq!(relative, PathBuf::from(".temp").join("abc123"));
    }

    #[test]
    fn test_os_temp_candidate_is_fresh() {
        let first = os_temp_candidate("fresh").unwrap();
        let second = os_temp_candidate("fresh").unwrap();
        assert_ne!(first, second);
        std::fs::remove_dir_all(&first).ok();
        std::fs::remove_dir_all(&second).ok();
    }
}
