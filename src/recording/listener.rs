// src/recording/listener.rs
//! Writer-side handler for delegated file deletion
//!
//! Capture files may still be held open by the process writing them, so the
//! commit path never deletes them directly. It publishes the local path on
//! `handle_delete_file`; the writer runs this listener, closes its handle in
//! the pre-delete hook and removes the file.

use crate::recording::keys::DELETE_FILE_CHANNEL;
use crate::store::MetadataStore;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Called with the path before the file is removed
pub type PreDeleteHook = Arc<dyn Fn(&Path) + Send + Sync>;

pub struct DeleteFileListener {
    handle: Option<JoinHandle<()>>,
    removed: Arc<AtomicU64>,
}

impl DeleteFileListener {
    /// Subscribe and start handling delete requests
    ///
    /// The subscription is live when this returns.
    pub fn spawn(store: Arc<dyn MetadataStore>, hook: Option<PreDeleteHook>) -> Self {
        let mut rx = store.subscribe(DELETE_FILE_CHANNEL);
        let removed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&removed);

        info!("Listening on {}", DELETE_FILE_CHANNEL);

        let handle = tokio::spawn(async move {
            loop {
                let path = match rx.recv().await {
                    Ok(path) => path,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Delete listener lagged, {} request(s) dropped", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let path = Path::new(&path);
                if let Some(hook) = &hook {
                    hook(path);
                }

                match tokio::fs::remove_file(path).await {
                    Ok(()) => {
                        counter.fetch_add(1, Ordering::Relaxed);
                        debug!("Deleted committed file {:?}", path);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        debug!("{:?} already gone", path);
                    }
                    Err(e) => warn!("Failed to delete {:?}: {}", path, e),
                }
            }
            debug!("Delete channel closed");
        });

        Self {
            handle: Some(handle),
            removed,
        }
    }

    /// Files removed so far
    pub fn removed_count(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }

    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for DeleteFileListener {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
