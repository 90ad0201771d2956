// src/lib.rs
//! Recording Engine Library
//!
//! Lifecycle, page index and commit-to-storage protocol for recordings of
//! captured web archives, coordinated through a shared metadata store.
//!
//! # Architecture
//!
//! - **recording**: Recording handles, file registry, pages, commit, copy
//! - **store**: Metadata store contract and in-memory implementation
//! - **storage**: Remote storage contract, directory backend, byte loader
//! - **observability**: Tracing subscriber and Prometheus metrics
//! - **utils**: Configuration, errors, timestamps

pub mod observability;
pub mod recording;
pub mod storage;
pub mod store;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use recording::{
    CommitOutcome, CommitReport, CommitSweeper, DeleteFileListener, PageEntry, Recording,
    RecordingContext,
};
pub use storage::{DirectoryStorage, LocalLoader, Storage};
pub use store::{MemoryStore, MetadataStore};
pub use utils::config::EngineConfig;
pub use utils::errors::{RecorderError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
