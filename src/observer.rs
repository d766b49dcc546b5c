//! Process-wide observer for orchestrator runs.
//!
//! The library never talks to a metrics backend directly. The server binary
//! installs a recorder that forwards to the `metrics` facade; tests install
//! counting recorders.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

use crate::error::ClusterError;

/// Summary of a successful run handed to [`RunMetrics::record_run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStats {
    pub rounds: usize,
    pub assigned: usize,
    pub rejected_threshold: usize,
    pub rejected_full: usize,
    pub new_clusters: usize,
    pub remaining_noise: usize,
}

/// Metrics observer for orchestrator runs.
pub trait RunMetrics: Send + Sync {
    fn record_run(&self, latency: Duration, result: Result<RunStats, &ClusterError>);
}

/// Install or clear the global run metrics recorder.
pub fn set_run_metrics(recorder: Option<Arc<dyn RunMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn RunMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn RunMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

fn metrics_recorder() -> Option<Arc<dyn RunMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

pub(crate) struct MetricsSpan {
    recorder: Arc<dyn RunMetrics>,
    start: Instant,
}

impl MetricsSpan {
    pub(crate) fn start() -> Option<Self> {
        metrics_recorder().map(|recorder| Self {
            recorder,
            start: Instant::now(),
        })
    }

    pub(crate) fn record(self, result: Result<RunStats, &ClusterError>) {
        self.recorder.record_run(self.start.elapsed(), result);
    }
}
