//! Process-wide logging and metrics setup for the server binary.

use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

use crate::error::ClusterError;
use crate::observer::{RunMetrics, RunStats};

/// JSON logs; `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .try_init();
}

pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}

/// Forwards orchestrator runs to the `metrics` facade.
#[derive(Debug, Default)]
pub struct PrometheusRunMetrics;

impl RunMetrics for PrometheusRunMetrics {
    fn record_run(&self, latency: Duration, result: Result<RunStats, &ClusterError>) {
        ::metrics::histogram!("artclust_run_seconds").record(latency.as_secs_f64());
        match result {
            Ok(stats) => {
                ::metrics::counter!("artclust_runs_total", "outcome" => "ok").increment(1);
                ::metrics::counter!("artclust_items_assigned_total").increment(stats.assigned as u64);
                ::metrics::counter!("artclust_items_rejected_total", "reason" => "threshold")
                    .increment(stats.rejected_threshold as u64);
                ::metrics::counter!("artclust_items_rejected_total", "reason" => "full")
                    .increment(stats.rejected_full as u64);
                ::metrics::counter!("artclust_clusters_created_total")
                    .increment(stats.new_clusters as u64);
                ::metrics::gauge!("artclust_remaining_noise").set(stats.remaining_noise as f64);
            }
            Err(_) => {
                ::metrics::counter!("artclust_runs_total", "outcome" => "error").increment(1);
            }
        }
    }
}
