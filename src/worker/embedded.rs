//! Embedded exiftool executable.
//!
//! Windows users often do not have exiftool on their PATH, so builds with the
//! `embedded-worker` feature carry a copy of `exiftool.exe` (staged by
//! `build.rs`) and unpack it into the private workspace on demand.
//!
//! # Build Requirements
//!
//! 1. Put `exiftool.exe` in `resources/`, or point `EXIFGATE_EMBED_EXIFTOOL` at it.
//! 2. Build with the feature: `cargo build --features embedded-worker`

use std::io;
use std::path::PathBuf;

use crate::workspace::Workspace;

/// Embedded worker binary (included at compile time).
#[cfg(feature = "embedded-worker")]
static EMBEDDED_WORKER: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/exiftool.exe"));

/// File name prefix of the extracted executable.
pub const EXTRACTED_PREFIX: &str = "exiftool";

/// File name suffix of the extracted executable.
pub const EXTRACTED_SUFFIX: &str = ".exe";

/// Write the embedded executable into `workspace` and return its path.
///
/// The file gets the workspace's owner-only permissions. The caller is
/// responsible for deleting it.
#[cfg(feature = "embedded-worker")]
pub fn extract_worker(workspace: &Workspace) -> io::Result<PathBuf> {
    workspace.write_executable(EXTRACTED_PREFIX, EXTRACTED_SUFFIX, EMBEDDED_WORKER)
}

/// Extract the embedded worker binary (stub for when feature is disabled).
#[cfg(not(feature = "embedded-worker"))]
pub fn extract_worker(_workspace: &Workspace) -> io::Result<PathBuf> {
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "embedded exiftool not available; build with --features embedded-worker",
    ))
}

/// Check if the embedded worker is available.
pub fn is_embedded_available() -> bool {
    cfg!(feature = "embedded-worker")
}

/// Whether a failed launch may fall back to the embedded executable.
pub fn fallback_allowed(extract_embedded: bool) -> bool {
    cfg!(windows) && extract_embedded
}
