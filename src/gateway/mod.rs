//! Metadata gateway.
//!
//! The gateway is the entry point for hosts: it decides whether a response
//! is worth sending to the worker, stages its body in the private workspace,
//! runs one exchange and cleans up.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MetadataGateway                            │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │  MIME gate          │  Ignore rules (Arc snapshots)       │  │
//! │  │  - stated type      │  - types_to_ignore                  │  │
//! │  │  - inferred type    │  - lines_to_ignore                  │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │         │ stage                          ▲ unstage              │
//! │         ▼                                │                      │
//! │  ┌──────────────────┐    ┌──────────────────────────────────┐   │
//! │  │    Workspace     │    │  WorkerSupervisor (one exchange  │   │
//! │  │  (owner-only)    │───▶│  at a time over stdin/stdout)    │   │
//! │  └──────────────────┘    └──────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use exifgate::config::Settings;
//! use exifgate::gateway::{MetadataGateway, ResponseInfo};
//! use exifgate::worker::Mode;
//!
//! let gateway = MetadataGateway::start(&Settings::load()?).await?;
//!
//! let info = ResponseInfo::from_http(&raw_response);
//! let lines = gateway.extract(&raw_response, &info, Mode::Plain).await?;
//!
//! gateway.shutdown().await;
//! ```

mod extractor;
mod response;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::{Settings, WorkerSettings};
use crate::worker::{EngineResult, LineFilter, Mode, WorkerSupervisor};
use crate::workspace::Workspace;

pub use extractor::MetadataExtractor;
pub use response::{sniff_mime_type, ResponseInfo, ResponseMetadata};

/// Runs metadata extraction for any number of concurrent callers.
///
/// Share it behind an `Arc`. Staging happens concurrently; exchanges with the
/// worker are serialized.
#[derive(Debug)]
pub struct MetadataGateway {
    workspace: Workspace,
    supervisor: WorkerSupervisor,

    /// MIME types never sent to the worker.
    types_to_ignore: RwLock<Arc<HashSet<String>>>,

    /// Result-line filter.
    lines_to_ignore: RwLock<Arc<LineFilter>>,

    /// Shutdown timings.
    worker_settings: WorkerSettings,
}

impl MetadataGateway {
    /// Create the workspace, start the worker and load the ignore rules.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceInit` or `WorkerLaunch`. The workspace is deleted
    /// before a launch error is returned.
    pub async fn start(settings: &Settings) -> EngineResult<Self> {
        let workspace = Workspace::create()?;
        Self::with_workspace(workspace, settings).await
    }

    /// Start the worker against an existing workspace.
    ///
    /// The gateway takes ownership of the workspace, and destroys it on failure.
    pub async fn with_workspace(workspace: Workspace, settings: &Settings) -> EngineResult<Self> {
        let supervisor = match WorkerSupervisor::start(&workspace, &settings.worker).await {
            Ok(supervisor) => supervisor,
            Err(e) => {
                workspace.destroy();
                return Err(e);
            }
        };

        Ok(Self {
            workspace,
            supervisor,
            types_to_ignore: RwLock::new(Arc::new(settings.ignore.types.iter().cloned().collect())),
            lines_to_ignore: RwLock::new(Arc::new(LineFilter::new(&settings.ignore.lines))),
            worker_settings: settings.worker.clone(),
        })
    }

    /// Replace the set of ignored MIME types.
    pub async fn set_types_to_ignore<I, S>(&self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: HashSet<String> = types.into_iter().map(Into::into).collect();
        *self.types_to_ignore.write().await = Arc::new(types);
    }

    /// Replace the ignored result-line fields.
    ///
    /// Each term drops lines that start with `term:`.
    pub async fn set_lines_to_ignore<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filter = LineFilter::new(lines);
        *self.lines_to_ignore.write().await = Arc::new(filter);
    }

    /// Current ignored MIME types.
    pub async fn types_to_ignore(&self) -> Arc<HashSet<String>> {
        self.types_to_ignore.read().await.clone()
    }

    /// Current result-line filter.
    pub async fn lines_to_ignore(&self) -> Arc<LineFilter> {
        self.lines_to_ignore.read().await.clone()
    }

    /// Whether a response may be sent to the worker.
    ///
    /// False if either the stated or the inferred MIME type is ignored.
    pub async fn is_eligible(&self, metadata: &dyn ResponseMetadata) -> bool {
        let ignored = self.types_to_ignore().await;
        passes_type_gate(ignored.as_ref(), metadata)
    }

    /// Whether a raw HTTP response may be sent to the worker.
    pub async fn can_read_metadata(&self, raw_response: &[u8]) -> bool {
        self.is_eligible(&ResponseInfo::from_http(raw_response)).await
    }

    /// Extract metadata from the body of `raw`.
    ///
    /// Returns an empty list for ineligible content. The staged file is
    /// deleted before returning, whether the exchange succeeded or not.
    pub async fn extract(
        &self,
        raw: &[u8],
        metadata: &dyn ResponseMetadata,
        mode: Mode,
    ) -> EngineResult<Vec<String>> {
        if !self.is_eligible(metadata).await {
            debug!(
                stated = ?metadata.stated_mime_type(),
                inferred = ?metadata.inferred_mime_type(),
                "ignoring MIME type"
            );
            return Ok(Vec::new());
        }

        let staged = self.workspace.stage(raw, metadata.body_offset())?;
        let filter = self.lines_to_ignore().await;
        let result = self.supervisor.exchange(mode, staged.path(), &filter).await;
        staged.unstage();

        let response = result?;
        Ok(response.lines)
    }

    /// Extract plain metadata from a raw HTTP response.
    pub async fn read_metadata(&self, raw_response: &[u8]) -> EngineResult<Vec<String>> {
        let info = ResponseInfo::from_http(raw_response);
        self.extract(raw_response, &info, Mode::Plain).await
    }

    /// Extract HTML-formatted metadata from a raw HTTP response.
    pub async fn read_metadata_html(&self, raw_response: &[u8]) -> EngineResult<Vec<String>> {
        let info = ResponseInfo::from_http(raw_response);
        self.extract(raw_response, &info, Mode::Html).await
    }

    /// The worker supervisor.
    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    /// The staging workspace.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Stop the worker and delete everything on disk.
    ///
    /// The extracted executable (if any) and the workspace are deleted after
    /// the worker has exited or the wait has timed out. Never fails.
    pub async fn shutdown(self) {
        let settings = self.worker_settings;
        let extracted = self
            .supervisor
            .stop(
                settings.grace_period(),
                settings.exit_timeout(),
                settings.kill_on_timeout,
            )
            .await;

        if let Some(binary) = extracted {
            self.workspace.remove_artifact(&binary);
        }
        self.workspace.destroy();
    }
}

/// Whether neither MIME type of `metadata` is in `ignored`.
///
/// Absent types never match.
pub fn passes_type_gate(ignored: &HashSet<String>, metadata: &dyn ResponseMetadata) -> bool {
    let is_ignored = |mime: Option<&str>| mime.is_some_and(|m| ignored.contains(m));
    !is_ignored(metadata.stated_mime_type()) && !is_ignored(metadata.inferred_mime_type())
}
