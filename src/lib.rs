//! # exifgate
//!
//! Extracts file metadata from intercepted HTTP response bodies by feeding
//! them to a single long-running exiftool process.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Host (raw response bytes + MIME metadata)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [gateway]
//! ┌─────────────────────────────────────────────────────────┐
//! │   MIME gate → stage body → exchange → unstage           │
//! └─────────────────────────────────────────────────────────┘
//!            │                              │
//!            ▼ [workspace]                  ▼ [worker]
//! ┌──────────────────────────┐  ┌───────────────────────────┐
//! │ owner-only temp dir and  │  │ exiftool -stay_open True  │
//! │ per-request payload file │  │ line protocol, {ready}    │
//! └──────────────────────────┘  └───────────────────────────┘
//! ```

pub mod config;
pub mod gateway;
pub mod logging;
pub mod worker;
pub mod workspace;

pub use config::Settings;
pub use gateway::{MetadataExtractor, MetadataGateway, ResponseInfo, ResponseMetadata};
pub use worker::{EngineError, EngineResult, Mode};
