//! Orchestrates name mapping, extraction, and linking.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::checksum;
use crate::error::LoadError;
use crate::extract;
use crate::linker::{NativeLinker, SystemLinker};
use crate::platform::{Os, Platform};
use crate::resources::ResourceSource;
use crate::scratch;

/// Environment variable naming a fixed directory searched for
/// pre-existing library copies when extraction fails everywhere, e.g.
/// for applet-like environments with a managed library directory.
pub const SEARCH_PATH_VAR: &str = "NATIVE_LOADER_PATH";

/// Loads native shared libraries for the platform the process runs on.
///
/// Each loader owns a process-scoped registry of what it has loaded:
/// a library name is linked at most once per loader, concurrent
/// requests for the same name observe a single winner, and repeat
/// requests short-circuit to the recorded result without touching the
/// filesystem. Failed loads are not recorded; a later call repeats the
/// full fallback chain.
///
/// ```ignore
/// let loader = NativeLoader::new(Bundle::new("natives"));
/// let path = loader.load("yoga")?;
/// ```
pub struct NativeLoader {
    platform: Platform,
    resources: Box<dyn ResourceSource>,
    linker: Box<dyn NativeLinker>,
    search_path: Option<PathBuf>,
    /// Logical name to extracted path, or `None` when the platform
    /// handled the load without a file. Doubles as the global load
    /// lock: every load attempt runs to completion while holding it.
    registry: Mutex<HashMap<String, Option<PathBuf>>>,
}

impl NativeLoader {
    /// Create a loader for the host platform, linking through the OS
    /// dynamic loader.
    pub fn new(resources: impl ResourceSource + 'static) -> Self {
        NativeLoader {
            platform: Platform::host(),
            resources: Box::new(resources),
            linker: Box::new(SystemLinker::new()),
            search_path: None,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Override the platform description.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Override the link primitive.
    pub fn with_linker(mut self, linker: impl NativeLinker + 'static) -> Self {
        self.linker = Box::new(linker);
        self
    }

    /// Override the fixed search-path directory consulted as the last
    /// fallback. Defaults to the `NATIVE_LOADER_PATH` environment
    /// variable.
    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_path = Some(dir.into());
        self
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Map a platform-independent library name to the filename the
    /// current platform expects. See [`Platform::map_library_name`].
    pub fn map_name(&self, library_name: &str) -> String {
        self.platform.map_library_name(library_name)
    }

    /// Whether `library_name` has already been loaded by this loader.
    pub fn is_loaded(&self, library_name: &str) -> bool {
        self.registry.lock().contains_key(library_name)
    }

    /// Load a shared library, autodetecting the platform filename.
    ///
    /// Returns the path the library was extracted to and linked from,
    /// or `None` if the platform handled the load without a file (iOS
    /// links natives statically; Android resolves them through its own
    /// search path).
    pub fn load(&self, library_name: &str) -> Result<Option<PathBuf>, LoadError> {
        let filename = self.map_name(library_name);
        self.load_with_filename(library_name, &filename)
    }

    /// Load a shared library with an explicitly supplied filename,
    /// bypassing name mapping.
    pub fn load_with_filename(
        &self,
        library_name: &str,
        library_filename: &str,
    ) -> Result<Option<PathBuf>, LoadError> {
        let mut registry = self.registry.lock();

        if let Some(entry) = registry.get(library_name) {
            return Ok(entry.clone());
        }

        match self.platform.os() {
            // Natives are linked statically into the executable;
            // nothing to extract or link.
            Os::Ios => {
                registry.insert(library_name.to_string(), None);
                Ok(None)
            }
            // The platform manages its own library search path;
            // delegate to it with the mapped filename.
            Os::Android => {
                self.linker
                    .link_name(library_filename)
                    .map_err(|err| self.load_failure(library_filename, Vec::new(), err))?;
                registry.insert(library_name.to_string(), None);
                Ok(None)
            }
            _ => {
                let path = self.extract_and_link(library_filename)?;
                tracing::info!("loaded {} from {}", library_name, path.display());
                registry.insert(library_name.to_string(), Some(path.clone()));
                Ok(Some(path))
            }
        }
    }

    /// Extract a resource to the first writable location without
    /// linking it, for callers managing their own load step.
    ///
    /// The extraction directory is named by `dir_tag`, defaulting to
    /// the resource's fingerprint. If the tagged directory is unusable
    /// the extraction is retried once under a fresh random tag; if
    /// extraction fails entirely but a copy exists under the fixed
    /// search path, that copy is returned.
    pub fn extract_resource(
        &self,
        source_path: &str,
        dir_tag: Option<&str>,
    ) -> Result<PathBuf, LoadError> {
        let fingerprint = self.fingerprint(source_path)?;
        let dir_name = dir_tag.unwrap_or(&fingerprint);
        let file_name = base_name(source_path);

        match self.extract_to_writable(source_path, &fingerprint, dir_name, file_name) {
            Ok(path) => Ok(path),
            Err(err) => {
                if let Some(dir) = self.search_dir() {
                    let existing = dir.join(source_path);
                    if existing.exists() {
                        tracing::debug!(
                            "extraction failed, using pre-existing copy {}",
                            existing.display()
                        );
                        return Ok(existing);
                    }
                }
                Err(err)
            }
        }
    }

    /// Extract a resource into an explicit directory, keeping the
    /// source file's base name.
    pub fn extract_resource_to_dir(
        &self,
        source_path: &str,
        target_dir: impl AsRef<Path>,
    ) -> Result<PathBuf, LoadError> {
        let dest = target_dir.as_ref().join(base_name(source_path));
        extract::ensure_extracted(
            self.resources.as_ref(),
            &self.platform,
            source_path,
            &dest,
        )
    }

    fn fingerprint(&self, source_path: &str) -> Result<String, LoadError> {
        let mut stream = self.resources.open(&self.platform, source_path)?;
        Ok(checksum::crc(&mut stream))
    }

    fn search_dir(&self) -> Option<PathBuf> {
        self.search_path
            .clone()
            .or_else(|| env::var_os(SEARCH_PATH_VAR).map(PathBuf::from))
    }

    fn extract_to_writable(
        &self,
        source_path: &str,
        fingerprint: &str,
        dir_name: &str,
        file_name: &str,
    ) -> Result<PathBuf, LoadError> {
        let dest = match scratch::find_writable_file(dir_name, file_name) {
            Some(dest) => dest,
            None => {
                // A stale or colliding tag directory can be unusable
                // while the machine is otherwise fine; retry once under
                // a fresh random tag before giving up.
                random_tag()
                    .and_then(|tag| scratch::find_writable_file(&tag, file_name))
                    .ok_or_else(|| LoadError::NoWritableLocation {
                        dir_name: dir_name.to_string(),
                    })?
            }
        };

        extract::extract_with_fingerprint(
            self.resources.as_ref(),
            &self.platform,
            source_path,
            fingerprint,
            &dest,
        )
    }

    /// Try extraction+link against every candidate location in priority
    /// order, then a pre-existing copy under the fixed search path.
    fn extract_and_link(&self, filename: &str) -> Result<PathBuf, LoadError> {
        let fingerprint = self
            .fingerprint(filename)
            .map_err(|err| self.load_failure(filename, Vec::new(), err))?;

        let mut attempts: Vec<String> = Vec::new();
        let mut link_failure: Option<LoadError> = None;

        let mut try_candidate = |dest: PathBuf| -> Option<PathBuf> {
            match extract::extract_with_fingerprint(
                self.resources.as_ref(),
                &self.platform,
                filename,
                &fingerprint,
                &dest,
            ) {
                Ok(path) => match self.linker.link_path(&path) {
                    Ok(()) => return Some(path),
                    Err(err) => {
                        tracing::debug!("linking {} failed: {}", path.display(), err);
                        attempts.push(err.to_string());
                        link_failure = Some(err);
                    }
                },
                Err(err) => {
                    tracing::debug!("extraction to {} failed: {}", dest.display(), err);
                    attempts.push(err.to_string());
                }
            }
            None
        };

        let dest = scratch::temp_candidate(&fingerprint).join(filename);
        if let Some(path) = try_candidate(dest) {
            return Ok(path);
        }

        if let Some(dir) = scratch::os_temp_candidate(&fingerprint) {
            if let Some(path) = try_candidate(dir.join(filename)) {
                return Ok(path);
            }
        }

        if let Some(dir) = scratch::home_candidate(&fingerprint) {
            if let Some(path) = try_candidate(dir.join(filename)) {
                return Ok(path);
            }
        }

        let dest = scratch::relative_candidate(&fingerprint).join(filename);
        if let Some(path) = try_candidate(dest) {
            return Ok(path);
        }

        // Last resort: a pre-existing copy under the fixed search path
        // is linked directly, without extraction.
        if let Some(dir) = self.search_dir() {
            let existing = dir.join(filename);
            if existing.exists() {
                match self.linker.link_path(&existing) {
                    Ok(()) => return Ok(existing),
                    Err(err) => {
                        tracing::debug!("linking {} failed: {}", existing.display(), err);
                        attempts.push(err.to_string());
                        link_failure = Some(err);
                    }
                }
            }
        }

        // When a candidate was extracted but refused to link, that is
        // the interesting cause; otherwise nothing was writable.
        let cause = link_failure.unwrap_or(LoadError::NoWritableLocation {
            dir_name: fingerprint.clone(),
        });
        Err(self.load_failure(filename, attempts, cause))
    }

    fn load_failure(&self, filename: &str, attempts: Vec<String>, cause: LoadError) -> LoadError {
        LoadError::LibraryLoad {
            filename: filename.to_string(),
            platform: self.platform.describe(),
            attempts,
            cause: Box::new(cause),
        }
    }
}

/// Base name of a slash-separated resource path.
fn base_name(source_path: &str) -> &str {
    source_path.rsplit('/').next().unwrap_or(source_path)
}

/// A fresh random directory tag, derived from an OS-issued temp file
/// name.
fn random_tag() -> Option<String> {
    let probe = tempfile::Builder::new()
        .prefix("native-loader-")
        .tempfile()
        .ok()?;
    let tag = probe.path().file_name()?.to_string_lossy().into_owned();
    Some(tag)
}
