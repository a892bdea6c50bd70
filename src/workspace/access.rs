//! Owner-only access enforcement for workspace entries.
//!
//! Two implementations sit behind [`AccessPolicy`]:
//!
//! - [`PosixAccess`]: mode bits applied atomically at creation (`0o700` for
//!   directories and executables, `0o600` for payload files).
//! - [`AclAccess`]: entries are created first and then locked down with
//!   `icacls`, removing inherited entries and granting the current user only.
//!
//! The policy is chosen once with [`native`] and shared by the workspace.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tempfile::{Builder, NamedTempFile, TempDir};

/// Creates workspace entries that only the current user can access.
///
/// Every method must leave nothing accessible to other principals when it
/// returns `Ok`; on error, anything it created is removed.
pub trait AccessPolicy: Send + Sync + fmt::Debug {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Create a private directory in the system temp location.
    fn create_dir(&self, prefix: &str) -> io::Result<TempDir>;

    /// Create a private read/write file inside `dir`, before any data is written.
    fn create_file(&self, dir: &Path, prefix: &str, suffix: &str) -> io::Result<NamedTempFile>;

    /// Create a private file inside `dir` that the owner may also execute.
    fn create_executable(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
    ) -> io::Result<NamedTempFile>;
}

/// Select the policy for the current platform.
pub fn native() -> Arc<dyn AccessPolicy> {
    #[cfg(unix)]
    {
        Arc::new(PosixAccess)
    }
    #[cfg(not(unix))]
    {
        Arc::new(AclAccess::for_current_user())
    }
}

/// Mode-bit policy for Unix-like systems.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixAccess;

#[cfg(unix)]
impl PosixAccess {
    const DIR_MODE: u32 = 0o700;
    const FILE_MODE: u32 = 0o600;
    const EXEC_MODE: u32 = 0o700;

    fn file_with_mode(
        dir: &Path,
        prefix: &str,
        suffix: &str,
        mode: u32,
    ) -> io::Result<NamedTempFile> {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .permissions(Permissions::from_mode(mode))
            .tempfile_in(dir)
    }
}

#[cfg(unix)]
impl AccessPolicy for PosixAccess {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn create_dir(&self, prefix: &str) -> io::Result<TempDir> {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        Builder::new()
            .prefix(prefix)
            .permissions(Permissions::from_mode(Self::DIR_MODE))
            .tempdir()
    }

    fn create_file(&self, dir: &Path, prefix: &str, suffix: &str) -> io::Result<NamedTempFile> {
        Self::file_with_mode(dir, prefix, suffix, Self::FILE_MODE)
    }

    fn create_executable(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
    ) -> io::Result<NamedTempFile> {
        Self::file_with_mode(dir, prefix, suffix, Self::EXEC_MODE)
    }
}

/// ACL policy for Windows, driven through `icacls`.
#[derive(Debug, Clone)]
pub struct AclAccess {
    /// Account name granted access, e.g. `DOMAIN\user`.
    principal: String,
}

impl AclAccess {
    /// Full control, inherited by everything created inside.
    const DIR_GRANT: &'static str = "(OI)(CI)F";
    /// Read, write and delete; no execute.
    const FILE_GRANT: &'static str = "(R,W,D)";
    /// Read, execute, write and delete.
    const EXEC_GRANT: &'static str = "(RX,W,D)";

    /// Build a policy granting access to `principal` only.
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
        }
    }

    /// Build a policy for the account running this process.
    pub fn for_current_user() -> Self {
        let user = std::env::var("USERNAME").unwrap_or_default();
        let principal = match std::env::var("USERDOMAIN") {
            Ok(domain) if !domain.is_empty() => format!("{}\\{}", domain, user),
            _ => user,
        };
        Self::new(principal)
    }

    /// The account this policy grants access to.
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Arguments passed to `icacls` to restrict `path`.
    pub fn icacls_args(&self, path: &Path, grant: &str) -> Vec<String> {
        vec![
            path.display().to_string(),
            "/inheritance:r".to_string(),
            "/grant:r".to_string(),
            format!("{}:{}", self.principal, grant),
        ]
    }

    fn restrict(&self, path: &Path, grant: &str) -> io::Result<()> {
        if self.principal.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot determine the current user for ACL restriction",
            ));
        }

        let output = Command::new("icacls")
            .args(self.icacls_args(path, grant))
            .output()?;

        if output.status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!(
                    "icacls failed for {} ({}): {}",
                    path.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }

    fn restricted_file(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
        grant: &str,
    ) -> io::Result<NamedTempFile> {
        // Dropped (and deleted) if the restriction fails.
        let file = Builder::new().prefix(prefix).suffix(suffix).tempfile_in(dir)?;
        self.restrict(file.path(), grant)?;
        Ok(file)
    }
}

impl AccessPolicy for AclAccess {
    fn name(&self) -> &'static str {
        "acl"
    }

    fn create_dir(&self, prefix: &str) -> io::Result<TempDir> {
        let dir = Builder::new().prefix(prefix).tempdir()?;
        self.restrict(dir.path(), Self::DIR_GRANT)?;
        Ok(dir)
    }

    fn create_file(&self, dir: &Path, prefix: &str, suffix: &str) -> io::Result<NamedTempFile> {
        self.restricted_file(dir, prefix, suffix, Self::FILE_GRANT)
    }

    fn create_executable(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
    ) -> io::Result<NamedTempFile> {
        self.restricted_file(dir, prefix, suffix, Self::EXEC_GRANT)
    }
}
