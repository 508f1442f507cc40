//! Error types for library resolution and loading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error raised while resolving, extracting, or linking a native library.
///
/// Failures of a single fallback candidate are swallowed where they
/// occur and logged at debug level; only exhaustion of every candidate
/// at a stage surfaces as one of these.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A caller-supplied value was empty or otherwise unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The resource exists neither at the root-relative path nor under
    /// the platform's fallback subtree (or is absent from the archive).
    #[error("resource not found: {path}")]
    ResourceNotFound { path: String },

    /// The configured natives archive could not be opened or read.
    #[error("failed to read archive {}", .archive.display())]
    ArchiveRead {
        archive: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Copying a resource to its destination failed.
    #[error("failed to extract {source_path} to {}", .dest.display())]
    Extraction {
        source_path: String,
        dest: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No candidate directory passed the write-and-execute probe.
    #[error("no writable location found for {dir_name}")]
    NoWritableLocation { dir_name: String },

    /// The platform link primitive rejected the binary.
    #[error("failed to link {target}")]
    Link {
        target: String,
        #[source]
        source: libloading::Error,
    },

    /// Every fallback location was exhausted.
    ///
    /// Terminal for this load attempt. The registry records only
    /// successes, so a later call for the same name repeats the full
    /// fallback chain.
    #[error(
        "couldn't load shared library `{filename}` for {platform}{}",
        attempts_suffix(.attempts)
    )]
    LibraryLoad {
        filename: String,
        platform: String,
        attempts: Vec<String>,
        #[source]
        cause: Box<LoadError>,
    },
}

fn attempts_suffix(attempts: &[String]) -> String {
    if attempts.is_empty() {
        String::new()
    } else {
        format!(" (tried: {})", attempts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_load_display_includes_attempts() {
        let err = LoadError::LibraryLoad {
            filename: "libyoga64.so".to_string(),
            platform: "Linux, 64-bit".to_string(),
            attempts: vec!["a failed".to_string(), "b failed".to_string()],
            cause: Box::new(LoadError::NoWritableLocation {
                dir_name: "abc123".to_string(),
            }),
        };

        let message = err.to_string();
        assert!(message.contains("libyoga64.so"));
        assert!(message.contains("Linux, 64-bit"));
        assert!(message.contains("a failed; b failed"));
    }

    #[test]
    fn test_library_load_source_is_terminating_cause() {
        use std::error::Error as _;

        let err = LoadError::LibraryLoad {
            filename: "libyoga.so".to_string(),
            platform: "Linux, 32-bit".to_string(),
            attempts: Vec::new(),
            cause: Box::new(LoadError::ResourceNotFound {
                path: "libyoga.so".to_string(),
            }),
        };

        let cause = err.source().expect("cause should be chained");
        assert!(cause.to_string().contains("resource not found"));
    }
}
