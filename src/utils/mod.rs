// src/utils/mod.rs
//! Shared utilities: configuration, errors, timestamps

pub mod config;
pub mod errors;
pub mod time;

pub use config::EngineConfig;
pub use errors::{RecorderError, Result};
