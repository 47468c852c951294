use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::config::MetricsConfig;
use crate::utils::error::{AppError, Result};

pub const TASKS_TOTAL: &str = "sweeper_tasks_total";
pub const ANOMALIES_TOTAL: &str = "sweeper_anomalies_total";
pub const PERSIST_FAILURES_TOTAL: &str = "sweeper_persist_failures_total";
pub const CURSOR: &str = "sweeper_cursor";

/// Task outcome label values for [`TASKS_TOTAL`].
pub mod outcome {
    pub const PRICED: &str = "priced";
    pub const EMPTY: &str = "empty";
    pub const FAILED: &str = "failed";
}

/// Starts the Prometheus scrape endpoint when metrics are enabled. Must be
/// called from inside a tokio runtime.
pub fn install_exporter(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| AppError::Metrics(e.to_string()))?;
    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}
