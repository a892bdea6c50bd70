//! Engine error types.

use std::io;
use thiserror::Error;

use crate::config::SettingsError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while running the metadata engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The private workspace or a staged file could not be created or secured.
    #[error("cannot prepare workspace: {context}")]
    WorkspaceInit {
        /// What was being attempted.
        context: String,
        #[source]
        source: io::Error,
    },

    /// The worker could not be started, from the search path or the embedded copy.
    #[error("cannot launch worker: {context}")]
    WorkerLaunch {
        /// What was being attempted.
        context: String,
        #[source]
        source: io::Error,
    },

    /// A pipe read or write failed during an exchange.
    #[error("exchange with worker failed: {0}")]
    ExchangeIo(#[source] io::Error),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Settings(#[from] SettingsError),
}

impl EngineError {
    /// Create a workspace error.
    pub fn workspace(context: impl Into<String>, source: io::Error) -> Self {
        Self::WorkspaceInit {
            context: context.into(),
            source,
        }
    }

    /// Create a launch error.
    pub fn launch(context: impl Into<String>, source: io::Error) -> Self {
        Self::WorkerLaunch {
            context: context.into(),
            source,
        }
    }

    /// Check if this error prevents the engine from being constructed.
    pub fn is_fatal_for_engine(&self) -> bool {
        matches!(
            self,
            Self::WorkspaceInit { .. } | Self::WorkerLaunch { .. } | Self::Settings(_)
        )
    }

    /// Check if this error came from a single exchange.
    ///
    /// The worker is not restarted afterwards; the pipe state is unknown.
    pub fn is_exchange(&self) -> bool {
        matches!(self, Self::ExchangeIo(_))
    }
}
