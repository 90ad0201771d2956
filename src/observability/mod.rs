// src/observability/mod.rs
//! Logging and metrics setup
//!
//! - **init_tracing**: installs the global `tracing` subscriber
//! - **init_metrics**: installs the Prometheus recorder behind the `metrics` macros
//! - **metric_names**: counters emitted by the commit and copy paths

use crate::utils::config::LogFormat;
use anyhow::anyhow;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

pub mod metric_names {
    pub const COMMIT_ATTEMPTS: &str = "recording_commit_attempts_total";
    pub const FILES_COMMITTED: &str = "recording_files_committed_total";
    pub const UPLOADS_FAILED: &str = "recording_uploads_failed_total";
    pub const BYTES_COPIED: &str = "recording_bytes_copied_total";
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    match format {
        LogFormat::Plain => tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(true)
            .json()
            .try_init(),
    }
    .map_err(|e| anyhow!("initialize tracing subscriber: {}", e))
}

/// Install the Prometheus recorder and return the handle used to render it
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("install metrics recorder: {}", e))?;

    metrics::describe_counter!(
        metric_names::COMMIT_ATTEMPTS,
        "Commit attempts on local files"
    );
    metrics::describe_counter!(
        metric_names::FILES_COMMITTED,
        "Files moved to remote storage"
    );
    metrics::describe_counter!(metric_names::UPLOADS_FAILED, "Rejected uploads");
    metrics::describe_counter!(
        metric_names::BYTES_COPIED,
        "Bytes copied between recordings"
    );

    Ok(handle)
}
