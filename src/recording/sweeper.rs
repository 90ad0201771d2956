// src/recording/sweeper.rs
//! Background commit sweeper
//!
//! Re-runs `commit_to_storage` on tracked recordings until each reports a
//! complete pass. Recordings whose owner is gone or that have no storage are
//! dropped on their first pass.

use crate::recording::Recording;
use crate::utils::config::SweeperConfig;
use crate::utils::errors::{RecorderError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct Tracked {
    recording: Recording,
    passes: u32,
}

/// Counters across all sweeps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweeperStats {
    pub sweeps: u64,
    pub completed: u64,
    pub abandoned: u64,
}

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub completed: Vec<String>,
    pub pending: Vec<String>,
    pub abandoned: Vec<String>,
}

pub struct CommitSweeper {
    config: SweeperConfig,
    tracked: Arc<Mutex<HashMap<String, Tracked>>>,
    stats: Arc<Mutex<SweeperStats>>,
    wake: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl CommitSweeper {
    pub fn new(config: SweeperConfig) -> Self {
        Self {
            config,
            tracked: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(Mutex::new(SweeperStats::default())),
            wake: Arc::new(Notify::new()),
            handle: None,
        }
    }

    /// Queue a closed recording for commit
    pub fn track(&self, recording: Recording) {
        debug!("Tracking {} for commit", recording.id());
        self.tracked.lock().insert(
            recording.id().to_string(),
            Tracked {
                recording,
                passes: 0,
            },
        );
    }

    pub fn untrack(&self, recording_id: &str) -> bool {
        self.tracked.lock().remove(recording_id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.tracked.lock().len()
    }

    pub fn is_tracked(&self, recording_id: &str) -> bool {
        self.tracked.lock().contains_key(recording_id)
    }

    pub fn stats(&self) -> SweeperStats {
        self.stats.lock().clone()
    }

    /// Run a sweep now instead of waiting for the next tick
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Start the background sweep loop
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(RecorderError::Config("sweeper already started".to_string()));
        }
        info!(
            "Starting commit sweeper (interval {:?})",
            self.config.interval()
        );

        let tracked = Arc::clone(&self.tracked);
        let stats = Arc::clone(&self.stats);
        let wake = Arc::clone(&self.wake);
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = wake.notified() => {}
                }
                Self::sweep(&tracked, &stats, config.max_passes).await;
            }
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// One pass over every tracked recording
    pub async fn sweep_once(&self) -> SweepSummary {
        Self::sweep(&self.tracked, &self.stats, self.config.max_passes).await
    }

    async fn sweep(
        tracked: &Mutex<HashMap<String, Tracked>>,
        stats: &Mutex<SweeperStats>,
        max_passes: Option<u32>,
    ) -> SweepSummary {
        let batch: Vec<Recording> = tracked
            .lock()
            .values()
            .map(|t| t.recording.clone())
            .collect();

        let mut summary = SweepSummary::default();

        for recording in batch {
            let id = recording.id().to_string();
            let finished = match recording.commit_to_storage().await {
                Ok(report) if !report.storage_configured => {
                    debug!("{} has no storage, dropping", id);
                    true
                }
                Ok(report) => report.is_complete(),
                Err(RecorderError::OwnerGone(_)) => {
                    debug!("Owner of {} gone, dropping", id);
                    true
                }
                Err(e) => {
                    error!("Commit of {} failed: {}", id, e);
                    false
                }
            };

            let mut guard = tracked.lock();
            if finished {
                guard.remove(&id);
                summary.completed.push(id);
                continue;
            }

            let Some(entry) = guard.get_mut(&id) else {
                continue;
            };
            entry.passes += 1;
            if max_passes.is_some_and(|max| entry.passes >= max) {
                warn!("Giving up on {} after {} passes", id, entry.passes);
                guard.remove(&id);
                summary.abandoned.push(id);
            } else {
                summary.pending.push(id);
            }
        }

        let mut s = stats.lock();
        s.sweeps += 1;
        s.completed += summary.completed.len() as u64;
        s.abandoned += summary.abandoned.len() as u64;

        summary
    }

    /// Stop the background loop
    pub async fn shutdown(&mut self) {
        info!("Shutting down commit sweeper");
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for CommitSweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
