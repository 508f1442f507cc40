//! Locating the raw bytes of a bundled native library.
//!
//! Resources are addressed by slash-separated logical paths. Streams
//! are single-pass: callers re-open for every read instead of reusing
//! a stream.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::LoadError;
use crate::platform::Platform;

/// A read-only store of native-library bytes.
pub trait ResourceSource: Send + Sync {
    /// Open a fresh stream for `source_path`.
    ///
    /// The platform contributes the OS-specific fallback subtree tried
    /// after the root-relative path.
    fn open(&self, platform: &Platform, source_path: &str) -> Result<Box<dyn Read>, LoadError>;
}

/// A directory tree of native libraries shipped beside the application.
///
/// Lookup order: `root/<path>`, then `root/<os fallback>/<path>`.
#[derive(Debug, Clone)]
pub struct Bundle {
    root: PathBuf,
}

impl Bundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Bundle { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceSource for Bundle {
    fn open(&self, platform: &Platform, source_path: &str) -> Result<Box<dyn Read>, LoadError> {
        require_path(source_path)?;

        let direct = self.root.join(source_path);
        if let Ok(file) = File::open(&direct) {
            return Ok(Box::new(file));
        }

        let fallback = self.root.join(platform.fallback_root()).join(source_path);
        if let Ok(file) = File::open(&fallback) {
            tracing::debug!(
                "resource {} resolved via fallback subtree {}",
                source_path,
                platform.fallback_root()
            );
            return Ok(Box::new(file));
        }

        Err(LoadError::ResourceNotFound {
            path: source_path.to_string(),
        })
    }
}

/// A single gzip-compressed tarball of native libraries.
///
/// Used when the libraries ship as one archive instead of a directory
/// tree, e.g. when testing a freshly built set of natives.
#[derive(Debug, Clone)]
pub struct NativesArchive {
    path: PathBuf,
}

impl NativesArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        NativesArchive { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, source: std::io::Error) -> LoadError {
        LoadError::ArchiveRead {
            archive: self.path.clone(),
            source,
        }
    }
}

impl ResourceSource for NativesArchive {
    fn open(&self, _platform: &Platform, source_path: &str) -> Result<Box<dyn Read>, LoadError> {
        require_path(source_path)?;

        let file = File::open(&self.path).map_err(|err| self.read_error(err))?;
        let mut archive = Archive::new(GzDecoder::new(file));

        for entry in archive.entries().map_err(|err| self.read_error(err))? {
            let mut entry = entry.map_err(|err| self.read_error(err))?;
            let entry_path = entry.path().map_err(|err| self.read_error(err))?;
            if !entry_matches(&entry_path, source_path) {
                continue;
            }

            // Tar entries are only readable while iterating, so the
            // matching entry is buffered and handed back as a cursor.
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|err| self.read_error(err))?;
            return Ok(Box::new(Cursor::new(bytes)));
        }

        Err(LoadError::ResourceNotFound {
            path: source_path.to_string(),
        })
    }
}

fn require_path(source_path: &str) -> Result<(), LoadError> {
    if source_path.is_empty() {
        Err(LoadError::InvalidInput("empty resource path".to_string()))
    } else {
        Ok(())
    }
}

/// Compare a tar entry path against a slash-separated logical path,
/// normalizing separators and a leading `./`.
fn entry_matches(entry_path: &Path, wanted: &str) -> bool {
    let normalized = entry_path.to_string_lossy().replace('\\', "/");
    normalized.trim_start_matches("./") == wanted
}
