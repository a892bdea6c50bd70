//! TOML-based configuration for exifgate.
//!
//! Supports a config file (exifgate.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [worker]
//! command = "exiftool"
//! path = "${EXIFTOOL_HOME}/exiftool"   # optional, skips the PATH lookup
//! grace_period_secs = 5
//! exit_timeout_secs = 30
//! kill_on_timeout = false
//!
//! [ignore]
//! types = ["text/html", "application/json"]
//! lines = ["ExifTool Version Number", "Directory"]
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Worker process configuration.
    pub worker: WorkerSettings,

    /// Ignore rules applied by the gateway.
    pub ignore: IgnoreSettings,

    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Worker process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Command looked up on the search path.
    pub command: String,

    /// Explicit executable path (supports ${ENV_VAR} expansion).
    pub path: Option<String>,

    /// Fall back to the embedded executable when the command is missing.
    ///
    /// Only honoured on Windows builds with the `embedded-worker` feature.
    pub extract_embedded: bool,

    /// Delay after the exit directive before waiting on the process.
    pub grace_period_secs: u64,

    /// Upper bound on the wait for the process to exit.
    pub exit_timeout_secs: u64,

    /// Kill the process if it is still running after `exit_timeout_secs`.
    pub kill_on_timeout: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            command: "exiftool".to_string(),
            path: None,
            extract_embedded: true,
            grace_period_secs: 5,
            exit_timeout_secs: 30,
            kill_on_timeout: false,
        }
    }
}

impl WorkerSettings {
    /// Grace period as a duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Exit timeout as a duration.
    pub fn exit_timeout(&self) -> Duration {
        Duration::from_secs(self.exit_timeout_secs)
    }

    /// Get the explicit executable path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        match &self.path {
            Some(path) => Ok(Some(PathBuf::from(expand_env_vars(path)?))),
            None => Ok(None),
        }
    }
}

/// Ignore rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IgnoreSettings {
    /// MIME types that are never handed to the worker.
    pub types: Vec<String>,

    /// Result-line field names dropped from the output.
    pub lines: Vec<String>,
}

impl Default for IgnoreSettings {
    fn default() -> Self {
        Self {
            types: vec![
                "text/html".to_string(),
                "text/css".to_string(),
                "application/javascript".to_string(),
                "application/json".to_string(),
                "text/plain".to_string(),
            ],
            lines: vec![
                "ExifTool Version Number".to_string(),
                "Directory".to_string(),
                "File Permissions".to_string(),
                "File Modification Date/Time".to_string(),
                "File Access Date/Time".to_string(),
                "File Inode Change Date/Time".to_string(),
            ],
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level filter (trace, debug, info, warn, error), overridden by RUST_LOG.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single line per event.
    #[default]
    Compact,
    /// Multi-line, human-readable.
    Pretty,
    /// Machine-readable.
    Json,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `EXIFGATE_CONFIG`
    /// 2. `./exifgate.toml`
    /// 3. `~/.config/exifgate/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("EXIFGATE_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("exifgate.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("exifgate").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
