//! Runtime extraction and loading of platform-specific native shared
//! libraries.
//!
//! Given a platform-independent logical name such as `"yoga"`, a
//! [`NativeLoader`] maps it to the filename the platform expects
//! (`libyoga64.so`, `yoga64.dll`, `libyoga64.dylib`, ...), finds the
//! library's bytes in a bundled resource tree or a `.tar.gz` archive,
//! extracts them to the first writable and executable location from a
//! prioritized candidate chain, and links the binary into the process.
//!
//! Extraction is cached content-addressed: the target directory is
//! named by the resource's CRC-32 fingerprint, so a byte-identical copy
//! left by an earlier run is reused without copying, a stale copy is
//! overwritten, and processes racing to extract the same library write
//! identical bytes. Each loader keeps a process-scoped registry so a
//! library is linked at most once, no matter how many threads ask.

pub mod checksum;
pub mod error;
pub mod extract;
pub mod linker;
pub mod loader;
pub mod platform;
pub mod resources;
pub mod scratch;

pub use error::LoadError;
pub use linker::{NativeLinker, SystemLinker};
pub use loader::{NativeLoader, SEARCH_PATH_VAR};
pub use platform::{Os, Platform};
pub use resources::{Bundle, NativesArchive, ResourceSource};
