//! Configuration module for exifgate.
//!
//! Handles the settings file, environment variables, and defaults.

mod settings;

pub use settings::{
    expand_env_vars, IgnoreSettings, LogFormat, LoggingSettings, Settings, SettingsError,
    WorkerSettings,
};
