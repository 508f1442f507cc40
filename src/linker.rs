//! The platform link step, behind a trait for testability.

use std::path::Path;

use libloading::Library;
use parking_lot::Mutex;

use crate::error::LoadError;

/// Maps a native binary into the running process.
///
/// Implementations must keep successfully linked binaries mapped for
/// the remaining lifetime of the process.
pub trait NativeLinker: Send + Sync {
    /// Link the binary at a filesystem path.
    fn link_path(&self, path: &Path) -> Result<(), LoadError>;

    /// Link by bare filename, resolved through the platform's own
    /// library search mechanism.
    fn link_name(&self, filename: &str) -> Result<(), LoadError>;
}

/// Linker backed by the operating system's dynamic loader.
///
/// Loaded handles are retained until process exit; dropping a
/// [`libloading::Library`] would unmap code that callers may still be
/// executing.
#[derive(Default)]
pub struct SystemLinker {
    retained: Mutex<Vec<Library>>,
}

impl SystemLinker {
    pub fn new() -> Self {
        SystemLinker::default()
    }

    fn retain(&self, library: Library) {
        self.retained.lock().push(library);
    }
}

impl NativeLinker for SystemLinker {
    fn link_path(&self, path: &Path) -> Result<(), LoadError> {
        // SAFETY: the library's initialization routines run on load;
        // the caller vouches for the binary being a library built for
        // this process, which is the whole contract of this crate.
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Link {
            target: path.display().to_string(),
            source,
        })?;
        self.retain(library);
        tracing::debug!("linked {}", path.display());
        Ok(())
    }

    fn link_name(&self, filename: &str) -> Result<(), LoadError> {
        // SAFETY: as for `link_path`; a bare filename defers the search
        // to the platform loader.
        let library = unsafe { Library::new(filename) }.map_err(|source| LoadError::Link {
            target: filename.to_string(),
            source,
        })?;
        self.retain(library);
        tracing::debug!("linked {} via the platform search path", filename);
        Ok(())
    }
}
