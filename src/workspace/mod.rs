//! Private staging area for request payloads.
//!
//! The worker reads its input from disk, so every payload is written to a
//! short-lived file inside a directory that only the current user can
//! access. Files are created with their final permissions before any byte is
//! written.
//!
//! ```text
//! $TMP/exifgate.XXXXXX/          (owner-only, lives as long as the engine)
//!   ├── file.XXXXXX              (one per in-flight exchange)
//!   └── exiftool.XXXXXX.exe      (Windows fallback only)
//! ```

pub mod access;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{TempDir, TempPath};
use tracing::{debug, warn};

use crate::worker::{EngineError, EngineResult};

pub use access::{AccessPolicy, AclAccess};
#[cfg(unix)]
pub use access::PosixAccess;

/// Prefix of the workspace directory name.
pub const WORKSPACE_PREFIX: &str = "exifgate";

/// Prefix of staged payload file names (no suffix is used).
const PAYLOAD_PREFIX: &str = "file";

/// A private temporary directory owned by one engine instance.
///
/// Dropping the workspace removes the directory silently; [`Workspace::destroy`]
/// does the same but logs failures.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    policy: Arc<dyn AccessPolicy>,
}

impl Workspace {
    /// Create a workspace using the platform's access policy.
    pub fn create() -> EngineResult<Self> {
        Self::with_policy(access::native())
    }

    /// Create a workspace with a specific access policy.
    pub fn with_policy(policy: Arc<dyn AccessPolicy>) -> EngineResult<Self> {
        let dir = policy.create_dir(WORKSPACE_PREFIX).map_err(|e| {
            EngineError::workspace("cannot create private temporary directory", e)
        })?;
        debug!(path = %dir.path().display(), policy = policy.name(), "workspace created");
        Ok(Self { dir, policy })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The access policy in use.
    pub fn policy(&self) -> &dyn AccessPolicy {
        self.policy.as_ref()
    }

    /// Write `payload[body_offset..]` to a new private file.
    ///
    /// An offset past the end of the payload stages an empty file.
    pub fn stage(&self, payload: &[u8], body_offset: usize) -> EngineResult<StagedPayload> {
        let body = payload.get(body_offset..).unwrap_or_default();

        let mut file = self
            .policy
            .create_file(self.path(), PAYLOAD_PREFIX, "")
            .map_err(|e| EngineError::workspace("cannot create staged payload file", e))?;
        file.write_all(body)
            .and_then(|_| file.flush())
            .map_err(|e| EngineError::workspace("cannot write staged payload file", e))?;

        let path = file.into_temp_path();
        debug!(path = %path.display(), bytes = body.len(), "payload staged");
        Ok(StagedPayload { path: Some(path) })
    }

    /// Write an executable into the workspace and return its path.
    ///
    /// The caller owns the returned path and removes it with
    /// [`Workspace::remove_artifact`].
    pub fn write_executable(&self, prefix: &str, suffix: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let mut file = self.policy.create_executable(self.path(), prefix, suffix)?;
        file.write_all(bytes)?;
        file.flush()?;
        let path = file.into_temp_path().keep().map_err(|e| e.error)?;
        Ok(path)
    }

    /// Best-effort removal of a file previously written into the workspace.
    pub fn remove_artifact(&self, path: &Path) {
        debug!(path = %path.display(), "deleting artifact");
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "cannot delete artifact");
            }
        }
    }

    /// Delete the workspace directory and anything left inside it.
    ///
    /// Failures are logged, never returned.
    pub fn destroy(self) {
        let path = self.dir.path().to_path_buf();
        debug!(path = %path.display(), "deleting workspace");
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "cannot delete workspace");
        }
    }
}

/// One request's payload on disk.
///
/// The file is removed by [`StagedPayload::unstage`] or, failing that, when
/// the value is dropped.
#[derive(Debug)]
pub struct StagedPayload {
    path: Option<TempPath>,
}

impl StagedPayload {
    /// Path of the staged file.
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }

    /// Delete the staged file. A file that is already gone is not an error.
    pub fn unstage(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let shown = path.display().to_string();
        debug!(path = %shown, "deleting staged payload");
        if let Err(e) = path.close() {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %shown, error = %e, "cannot delete staged payload");
            }
        }
    }
}

impl Drop for StagedPayload {
    fn drop(&mut self) {
        self.remove();
    }
}
