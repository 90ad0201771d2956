// src/recording/mod.rs
//! Recording lifecycle and commit-to-storage
//!
//! A recording is a set of captured archive files, a live index of captured
//! requests, a page list and some info, all kept in the metadata store:
//!
//! - **Lifecycle**: create, open lease, info, size, delete
//! - **Files**: registry of file locations and the derived index file
//! - **Pages**: user-visible page list keyed by url and timestamp
//! - **Commit**: lease-guarded, idempotent upload of local files to storage
//! - **Copy**: merge another recording's data into this one
//! - **Sweeper**: background task re-running commits until complete
//! - **Listener**: writer-side handler for delegated file deletion
//!
//! # Commit flow
//!
//! ```text
//! writer closes ──> commit_to_storage ──> close_rec
//!                        │
//!            index file: build, upload, delete
//!                        │
//!            warc files: upload ──> handle_delete_file ──> writer deletes
//!                        │
//!            all remote ──> drop live index
//! ```
//!
//! Every step is safe to repeat. Several processes may commit the same
//! recording at once; the per-file commit-wait lease keeps uploads single.

pub mod collaborators;
pub mod commit;
pub mod copy;
pub mod files;
pub mod keys;
pub mod lifecycle;
pub mod listener;
pub mod pages;
pub mod sweeper;

// Re-export commonly used types
pub use collaborators::{
    AccessControl, Collection, IndexRecord, KeyCanonicalizer, SimpleCanonicalizer, User,
};
pub use commit::{CommitOutcome, CommitReport, CommitScope};
pub use files::{FileEntry, IndexFile};
pub use lifecycle::{DeleteReport, Recording, RecordingContext, RecordingInfo, RecordingSummary};
pub use listener::{DeleteFileListener, PreDeleteHook};
pub use pages::{ListedPage, PageEntry};
pub use sweeper::{CommitSweeper, SweepSummary, SweeperStats};
