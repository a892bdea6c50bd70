//! Worker process module.
//!
//! This module drives a single long-running exiftool process in `-stay_open`
//! mode. Requests name a file on disk; responses are the tool's text output,
//! terminated by a sentinel line.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  exifgate (Rust + Tokio)                        │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                 WorkerSupervisor                          │  │
//! │  │  - Spawns exiftool with -stay_open True -@ -              │  │
//! │  │  - One exchange at a time over stdin/stdout               │  │
//! │  │  - Embedded exiftool.exe fallback on Windows              │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                              │                                  │
//! │        stdin (args, -execute)│ stdout (lines, {ready})          │
//! │                              ▼                                  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │               exiftool (Long-Running Child Process)             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod embedded;
mod error;
pub mod protocol;
mod supervisor;

pub use embedded::{extract_worker, is_embedded_available};
pub use error::{EngineError, EngineResult};
pub use protocol::{LineFilter, Mode, Response, Sentinel};
pub use supervisor::WorkerSupervisor;
