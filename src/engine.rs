//! One logical clustering run: Pass 1, then Pass 2, then diagnostics.
//!
//! The orchestrator works on a clone of the caller's store and hands the
//! clone back only when every step succeeded. An error therefore leaves the
//! caller with exactly the cluster set it passed in.
//!
//! With `settle` enabled (the default) Pass 1 + Pass 2 repeat over the
//! remaining noise until a round changes nothing. The last round of a run is
//! then a fixed point, so a second run over the same items is a no-op.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::assign::{AssignmentDecision, Candidate, IncrementalAssigner};
use crate::config::ClusteringConfig;
use crate::diagnostics::{CountsSnapshot, ItemDecision, MemberTitle, NewClusterReport, RunDiagnostics};
use crate::discover::ClusterDiscoverer;
use crate::error::ClusterError;
use crate::observer::{MetricsSpan, RunStats};
use crate::store::ClusterStore;
use crate::types::{Item, ItemId};

/// Updated cluster set plus the audit trail of the run that produced it.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub store: ClusterStore,
    pub diagnostics: RunDiagnostics,
}

#[derive(Debug, Clone)]
pub struct ClusteringOrchestrator {
    config: ClusteringConfig,
    assigner: IncrementalAssigner,
    discoverer: ClusterDiscoverer,
}

impl ClusteringOrchestrator {
    pub fn new(config: ClusteringConfig) -> Result<Self, ClusterError> {
        config.validate()?;
        let assigner = IncrementalAssigner::new(config.similarity_threshold);
        let discoverer = ClusterDiscoverer::new(config.discovery_epsilon, config.min_cluster_size)?;
        Ok(Self {
            config,
            assigner,
            discoverer,
        })
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Cluster `items` against `store`.
    ///
    /// `items` is the full input set; members of active clusters are skipped
    /// and items without an embedding are counted and ignored. `now` stamps
    /// every created or updated cluster.
    pub fn run(
        &self,
        store: &ClusterStore,
        items: &[Item],
        now: DateTime<Utc>,
    ) -> Result<RunOutput, ClusterError> {
        let span = tracing::info_span!("cluster_run", items = items.len());
        let _enter = span.enter();

        let metrics = MetricsSpan::start();
        let result = self.run_inner(store, items, now);

        match &result {
            Ok(output) => {
                let diag = &output.diagnostics;
                let stats = run_stats(diag);
                tracing::info!(
                    rounds = stats.rounds,
                    assigned = stats.assigned,
                    new_clusters = stats.new_clusters,
                    remaining_noise = stats.remaining_noise,
                    clusters = diag.after().clusters,
                    "clustering run complete"
                );
                if let Some(span) = metrics {
                    span.record(Ok(stats));
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "clustering run aborted");
                if let Some(span) = metrics {
                    span.record(Err(err));
                }
            }
        }
        result
    }

    fn run_inner(
        &self,
        store: &ClusterStore,
        items: &[Item],
        now: DateTime<Utc>,
    ) -> Result<RunOutput, ClusterError> {
        self.check_store(store)?;
        let candidates = self.candidates(items)?;
        let skipped_without_embedding = items.len() - candidates.len();

        let mut store = store.clone();
        let mut pending: Vec<Candidate<'_>> = candidates
            .into_iter()
            .filter(|c| !store.is_clustered(c.id()))
            .collect();
        let before = counts(&store, pending.len());
        let titles: HashMap<&ItemId, &str> = pending
            .iter()
            .map(|c| (c.id(), c.item.title.as_str()))
            .collect();

        let mut decisions = Vec::new();
        let mut new_clusters = Vec::new();
        let mut rounds = 0;

        while !pending.is_empty() {
            rounds += 1;

            let pass_one = self.assigner.assign(&mut store, &pending, now)?;
            let assigned = pass_one.assigned_count();
            decisions.extend(pass_one.decisions.into_iter().map(|(item_id, decision)| {
                ItemDecision {
                    round: rounds,
                    item_id,
                    decision,
                }
            }));

            let discovered = self.discoverer.discover(&mut store, &pass_one.rejected, now)?;
            let created = discovered.created.len();
            for cluster in discovered.created {
                new_clusters.push(NewClusterReport {
                    cluster_id: cluster.cluster_id,
                    round: rounds,
                    members: cluster
                        .member_ids
                        .into_iter()
                        .map(|id| MemberTitle {
                            title: titles.get(&id).copied().unwrap_or_default().to_string(),
                            id,
                        })
                        .collect(),
                });
            }

            let noise: HashSet<&ItemId> = discovered.noise.iter().collect();
            pending = pass_one
                .rejected
                .into_iter()
                .filter(|c| noise.contains(c.id()))
                .collect();

            tracing::debug!(
                round = rounds,
                assigned,
                created,
                pending = pending.len(),
                "round finished"
            );
            if !self.config.settle || (assigned == 0 && created == 0) {
                break;
            }
        }

        let remaining_noise: Vec<ItemId> = pending.iter().map(|c| c.id().clone()).collect();
        let after = counts(&store, remaining_noise.len());

        Ok(RunOutput {
            store,
            diagnostics: RunDiagnostics {
                ran_at: now,
                before,
                after,
                skipped_without_embedding,
                rounds,
                decisions,
                new_clusters,
                remaining_noise,
            },
        })
    }

    fn check_store(&self, store: &ClusterStore) -> Result<(), ClusterError> {
        if store.dimension() != self.config.dimension {
            return Err(ClusterError::InvalidConfig(format!(
                "store dimension {} does not match configured dimension {}",
                store.dimension(),
                self.config.dimension
            )));
        }
        if store.max_cluster_size() != self.config.max_cluster_size {
            return Err(ClusterError::InvalidConfig(format!(
                "store capacity {} does not match configured max_cluster_size {}",
                store.max_cluster_size(),
                self.config.max_cluster_size
            )));
        }
        Ok(())
    }

    /// Items with an embedding, after duplicate and dimension checks.
    fn candidates<'a>(&self, items: &'a [Item]) -> Result<Vec<Candidate<'a>>, ClusterError> {
        let mut seen = HashSet::with_capacity(items.len());
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if !seen.insert(&item.id) {
                return Err(ClusterError::DuplicateItem(item.id.clone()));
            }
            if let Some(candidate) = Candidate::from_item(item) {
                candidate.embedding.check_dim(self.config.dimension)?;
                out.push(candidate);
            }
        }
        Ok(out)
    }
}

fn counts(store: &ClusterStore, noise: usize) -> CountsSnapshot {
    CountsSnapshot {
        clusters: store.active_count(),
        clustered_items: store.clustered_item_count(),
        noise,
    }
}

fn run_stats(diag: &RunDiagnostics) -> RunStats {
    let mut stats = RunStats {
        rounds: diag.rounds(),
        new_clusters: diag.new_clusters().len(),
        remaining_noise: diag.remaining_noise().len(),
        ..RunStats::default()
    };
    for d in diag.decisions() {
        match d.decision {
            AssignmentDecision::Assigned { .. } => stats.assigned += 1,
            AssignmentDecision::RejectedThreshold { .. } => {
                stats.rejected_threshold += 1
            }
            AssignmentDecision::RejectedFull { .. } => stats.rejected_full += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{RunMetrics, set_run_metrics};
    use crate::vector::Embedding;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn item(id: &str, v: &[f32]) -> Item {
        Item::new(id, Some(Embedding::new(v.to_vec()).unwrap())).with_title(format!("Title {id}"))
    }

    fn config(dimension: usize, max: usize) -> ClusteringConfig {
        ClusteringConfig {
            dimension,
            max_cluster_size: max,
            ..ClusteringConfig::default()
        }
    }

    #[test]
    fn discovers_clusters_from_scratch() {
        let cfg = config(3, 10);
        let orchestrator = ClusteringOrchestrator::new(cfg.clone()).unwrap();
        let items = vec![
            item("a1", &[1.0, 0.1, 0.0]),
            item("a2", &[1.0, 0.0, 0.1]),
            item("b1", &[0.0, 1.0, 0.1]),
            item("b2", &[0.1, 1.0, 0.0]),
            item("x", &[-0.2, -0.2, 1.0]),
            Item::new("no-vector", None),
        ];

        let out = orchestrator
            .run(&ClusterStore::from_config(&cfg), &items, now())
            .unwrap();
        let diag = &out.diagnostics;

        assert_eq!(diag.new_clusters().len(), 2);
        assert_eq!(diag.remaining_noise(), &[ItemId::from("x")]);
        assert_eq!(diag.skipped_without_embedding(), 1);
        assert_eq!(diag.before().noise, 5);
        assert_eq!(diag.after().clusters, 2);
        assert_eq!(diag.after().clustered_items, 4);
        assert_eq!(diag.new_clusters()[0].members[0].title, "Title a1");
        assert_eq!(out.store.active_count(), 2);
    }

    #[test]
    fn second_run_changes_nothing() {
        let cfg = config(3, 10);
        let orchestrator = ClusteringOrchestrator::new(cfg.clone()).unwrap();
        let items = vec![
            item("a1", &[1.0, 0.1, 0.0]),
            item("a2", &[1.0, 0.0, 0.1]),
            item("a3", &[1.0, 0.05, 0.05]),
            item("x", &[-0.2, -0.2, 1.0]),
        ];

        let first = orchestrator
            .run(&ClusterStore::from_config(&cfg), &items, now())
            .unwrap();
        let second = orchestrator
            .run(&first.store, &items, now() + chrono::Duration::hours(1))
            .unwrap();

        assert_eq!(second.store.snapshot(), first.store.snapshot());
        assert!(second.diagnostics.is_quiescent());
    }

    fn leftover_fixture() -> (ClusteringConfig, Vec<Item>) {
        // "m" sits 30 degrees from the pair: too far for discovery, close
        // enough for Pass 1 once the pair has become a cluster.
        let cfg = ClusteringConfig {
            discovery_epsilon: 0.05,
            ..config(2, 10)
        };
        let items = vec![
            item("p1", &[1.0, 0.0]),
            item("p2", &[1.0, 0.0]),
            item("m", &[0.866_025_4, 0.5]),
        ];
        (cfg, items)
    }

    #[test]
    fn settle_assigns_leftovers_to_clusters_found_in_the_same_run() {
        let (cfg, items) = leftover_fixture();
        let orchestrator = ClusteringOrchestrator::new(cfg.clone()).unwrap();
        let out = orchestrator
            .run(&ClusterStore::from_config(&cfg), &items, now())
            .unwrap();

        let diag = &out.diagnostics;
        assert_eq!(diag.rounds(), 2);
        assert_eq!(diag.new_clusters().len(), 1);
        assert!(diag.remaining_noise().is_empty());
        let last = diag.decisions().last().unwrap();
        assert_eq!(last.round, 2);
        assert_eq!(last.item_id.as_str(), "m");
        assert!(last.decision.is_assigned());
        assert_eq!(out.store.clustered_item_count(), 3);
    }

    #[test]
    fn without_settle_only_one_round_runs() {
        let (cfg, items) = leftover_fixture();
        let cfg = ClusteringConfig {
            settle: false,
            ..cfg
        };
        let orchestrator = ClusteringOrchestrator::new(cfg.clone()).unwrap();
        let out = orchestrator
            .run(&ClusterStore::from_config(&cfg), &items, now())
            .unwrap();
        assert_eq!(out.diagnostics.rounds(), 1);
        assert_eq!(out.diagnostics.new_clusters().len(), 1);
        assert_eq!(out.diagnostics.remaining_noise(), &[ItemId::from("m")]);
    }

    #[test]
    fn duplicate_items_abort_the_run() {
        let cfg = config(2, 10);
        let orchestrator = ClusteringOrchestrator::new(cfg.clone()).unwrap();
        let items = vec![item("a", &[1.0, 0.0]), item("a", &[0.0, 1.0])];
        let err = orchestrator
            .run(&ClusterStore::from_config(&cfg), &items, now())
            .unwrap_err();
        assert_eq!(err, ClusterError::DuplicateItem(ItemId::from("a")));
    }

    #[test]
    fn store_and_config_must_agree() {
        let orchestrator = ClusteringOrchestrator::new(config(2, 10)).unwrap();
        let err = orchestrator
            .run(&ClusterStore::new(3, 10), &[], now())
            .unwrap_err();
        assert!(matches!(err, ClusterError::InvalidConfig(_)));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let cfg = ClusteringConfig {
            min_cluster_size: 1,
            ..ClusteringConfig::default()
        };
        assert!(ClusteringOrchestrator::new(cfg).is_err());
    }

    #[derive(Default)]
    struct CountingMetrics {
        runs: Mutex<Vec<Result<RunStats, String>>>,
    }

    impl RunMetrics for CountingMetrics {
        fn record_run(&self, _latency: Duration, result: Result<RunStats, &ClusterError>) {
            self.runs
                .lock()
                .unwrap()
                .push(result.map_err(|e| e.to_string()));
        }
    }

    #[test]
    fn metrics_recorder_sees_run_outcome() {
        let metrics = Arc::new(CountingMetrics::default());
        set_run_metrics(Some(metrics.clone()));

        let cfg = config(2, 10);
        let orchestrator = ClusteringOrchestrator::new(cfg.clone()).unwrap();
        let items = vec![item("p1", &[1.0, 0.0]), item("p2", &[1.0, 0.0])];
        orchestrator
            .run(&ClusterStore::from_config(&cfg), &items, now())
            .unwrap();

        set_run_metrics(None);

        let runs = metrics.runs.lock().unwrap();
        assert!(runs.iter().any(|r| matches!(r, Ok(stats) if stats.new_clusters == 1)));
    }
}
