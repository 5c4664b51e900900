//! # cadence-core
//!
//! Core types, configuration, and error handling for the Cadence playback engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::{Error, HttpError, Result};
pub use types::*;
