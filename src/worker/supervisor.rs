//! Lifecycle of the long-running exiftool process.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::embedded;
use super::error::{EngineError, EngineResult};
use super::protocol::{ExchangeChannel, LineFilter, Mode, Response, LAUNCH_ARGS};
use crate::config::WorkerSettings;
use crate::workspace::Workspace;

/// Owns the worker process and its pipes.
///
/// The process is started in `-stay_open` mode and serves every request until
/// [`WorkerSupervisor::stop`]. Exchanges are serialized on an internal lock,
/// since the pipes carry one request/response pair at a time. Each exchange
/// runs in its own task and always reads up to the sentinel, so a caller that
/// gives up early (e.g. through `tokio::time::timeout`) cannot leave a stale
/// reply in the pipe for the next one.
///
/// # Example
///
/// ```ignore
/// use exifgate::config::WorkerSettings;
/// use exifgate::workspace::Workspace;
/// use exifgate::worker::{protocol::{LineFilter, Mode}, WorkerSupervisor};
///
/// let workspace = Workspace::create()?;
/// let supervisor = WorkerSupervisor::start(&workspace, &WorkerSettings::default()).await?;
///
/// let staged = workspace.stage(&bytes, 0)?;
/// let result = supervisor.exchange(Mode::Plain, staged.path(), &LineFilter::default()).await;
/// staged.unstage();
/// let response = result?;
///
/// if let Some(binary) = supervisor.stop(Duration::from_secs(5), Duration::from_secs(30), false).await {
///     workspace.remove_artifact(&binary);
/// }
/// workspace.destroy();
/// ```
#[derive(Debug)]
pub struct WorkerSupervisor {
    /// Handle to the worker child process.
    child: Mutex<Child>,

    /// Worker stdin/stdout, locked for the duration of one exchange.
    channel: Arc<Mutex<ExchangeChannel<ChildStdin, ChildStdout>>>,

    /// Executable the process was started from.
    executable: PathBuf,

    /// Executable unpacked into the workspace, if the embedded fallback was used.
    extracted_binary: Option<PathBuf>,

    /// Process id at launch time.
    pid: Option<u32>,
}

impl WorkerSupervisor {
    /// Start the worker.
    ///
    /// Tries the configured path, or the configured command on the search
    /// path. If that fails and the embedded fallback is allowed (Windows), the
    /// embedded executable is unpacked into `workspace` and started instead.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WorkerLaunch`] if no worker could be started,
    /// and [`EngineError::Settings`] if the configured path cannot be expanded.
    pub async fn start(workspace: &Workspace, settings: &WorkerSettings) -> EngineResult<Self> {
        let primary = match settings.resolved_path()? {
            Some(path) => Ok(path),
            None => which::which(&settings.command).map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string())
            }),
        };

        let launched = primary.and_then(|path| Self::spawn(&path).map(|child| (child, path)));

        match launched {
            Ok((child, executable)) => Self::from_child(child, executable, None),
            Err(cause) => {
                info!(command = %settings.command, error = %cause, "worker not found");
                if !embedded::fallback_allowed(settings.extract_embedded) {
                    return Err(EngineError::launch(
                        format!(
                            "cannot run '{}'. Is it installed and on PATH?",
                            settings.command
                        ),
                        cause,
                    ));
                }
                Self::start_embedded(workspace, cause)
            }
        }
    }

    /// Unpack and start the embedded executable.
    fn start_embedded(workspace: &Workspace, cause: std::io::Error) -> EngineResult<Self> {
        let launch_error = |e: std::io::Error| {
            EngineError::launch(
                format!(
                    "cannot run or extract embedded exiftool ({}). Is exiftool on PATH?",
                    e
                ),
                std::io::Error::new(cause.kind(), cause.to_string()),
            )
        };

        let binary = embedded::extract_worker(workspace).map_err(launch_error)?;
        info!(path = %binary.display(), "extracted embedded worker");

        match Self::spawn(&binary) {
            Ok(child) => Self::from_child(child, binary.clone(), Some(binary)),
            Err(e) => {
                workspace.remove_artifact(&binary);
                Err(launch_error(e))
            }
        }
    }

    fn spawn(executable: &Path) -> std::io::Result<Child> {
        debug!(executable = %executable.display(), args = ?LAUNCH_ARGS, "spawning worker");
        Command::new(executable)
            .args(LAUNCH_ARGS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
    }

    fn from_child(
        mut child: Child,
        executable: PathBuf,
        extracted_binary: Option<PathBuf>,
    ) -> EngineResult<Self> {
        let pipes = child.stdin.take().zip(child.stdout.take());
        let Some((stdin, stdout)) = pipes else {
            return Err(EngineError::launch(
                "worker pipes were not captured",
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "missing stdin or stdout"),
            ));
        };

        let pid = child.id();
        info!(pid = ?pid, executable = %executable.display(), "worker started");

        Ok(Self {
            child: Mutex::new(child),
            channel: Arc::new(Mutex::new(ExchangeChannel::new(stdin, stdout))),
            executable,
            extracted_binary,
            pid,
        })
    }

    /// Run one request/response cycle, waiting for any exchange in flight.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ExchangeIo`] if a pipe read or write fails. The
    /// worker is left as is; later exchanges are likely to fail as well.
    ///
    /// Dropping the returned future does not abort the exchange: the spawned
    /// task keeps the lock until the worker's sentinel has been read.
    pub async fn exchange(
        &self,
        mode: Mode,
        path: &Path,
        filter: &LineFilter,
    ) -> EngineResult<Response> {
        let channel = Arc::clone(&self.channel);
        let path = path.to_path_buf();
        let filter = filter.clone();

        let task = tokio::spawn(async move {
            let mut channel = channel.lock_owned().await;
            channel.exchange(mode, &path, &filter).await
        });

        match task.await {
            Ok(result) => result.map_err(EngineError::ExchangeIo),
            Err(e) => Err(EngineError::ExchangeIo(std::io::Error::other(e))),
        }
    }

    /// Check if the worker process is still running.
    pub async fn is_running(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    /// Process id of the worker.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Executable the worker was started from.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Path of the unpacked embedded executable, if one was used.
    pub fn extracted_binary(&self) -> Option<&Path> {
        self.extracted_binary.as_deref()
    }

    /// Ask the worker to exit and wait for it.
    ///
    /// Sends the exit directive, sleeps for `grace`, then waits up to
    /// `exit_timeout`. A worker still running after that is killed only when
    /// `kill_on_timeout` is set. Never fails; problems are logged.
    ///
    /// Returns the extracted executable, which the caller should delete now
    /// that the process no longer holds it.
    pub async fn stop(
        self,
        grace: Duration,
        exit_timeout: Duration,
        kill_on_timeout: bool,
    ) -> Option<PathBuf> {
        info!(pid = ?self.pid, "stopping worker");
        {
            let mut channel = self.channel.lock().await;
            if let Err(e) = channel.send_exit().await {
                warn!(error = %e, "cannot send exit directive");
            }
        }

        tokio::time::sleep(grace).await;

        let mut child = self.child.into_inner();
        match wait_bounded(&mut child, exit_timeout).await {
            Some(status) => info!(%status, "worker exited"),
            None if kill_on_timeout => {
                warn!(?exit_timeout, "worker did not exit in time, killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "cannot kill worker");
                }
            }
            None => warn!(?exit_timeout, "worker did not exit in time"),
        }

        self.extracted_binary
    }
}

/// Wait for `child` to exit for at most `timeout`.
async fn wait_bounded(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            warn!(error = %e, "cannot wait for worker");
            None
        }
        Err(_) => None,
    }
}
