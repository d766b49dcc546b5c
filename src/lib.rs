//! Incremental embedding-based clustering for article feeds.
//!
//! New articles are placed in two passes:
//!
//! 1. **Assignment** ([`IncrementalAssigner`]): each unclustered item joins
//!    the active cluster whose centroid is most similar, provided the
//!    similarity reaches the threshold and the cluster has room.
//! 2. **Discovery** ([`ClusterDiscoverer`]): items Pass 1 could not place are
//!    grouped with DBSCAN ([`DensityClusterer`]) and every dense group becomes
//!    a new cluster.
//!
//! [`ClusteringOrchestrator`] runs both passes as one transaction over a
//! [`ClusterStore`] and returns the updated store with [`RunDiagnostics`]
//! explaining every decision. The engine is synchronous and does no I/O;
//! persistence ([`ClusterRepository`]) and naming ([`Labeler`]) are
//! collaborators the caller drives.
//!
//! ```
//! use artclust::{ClusterStore, ClusteringConfig, ClusteringOrchestrator, Embedding, Item};
//! use chrono::Utc;
//!
//! let cfg = ClusteringConfig { dimension: 2, ..ClusteringConfig::default() };
//! let orchestrator = ClusteringOrchestrator::new(cfg.clone())?;
//! let items = vec![
//!     Item::new("a", Some(Embedding::new(vec![1.0, 0.0])?)),
//!     Item::new("b", Some(Embedding::new(vec![0.99, 0.05])?)),
//! ];
//! let out = orchestrator.run(&ClusterStore::from_config(&cfg), &items, Utc::now())?;
//! assert_eq!(out.store.active_count(), 1);
//! # Ok::<(), artclust::ClusterError>(())
//! ```

pub mod assign;
pub mod config;
pub mod density;
pub mod diagnostics;
pub mod discover;
pub mod engine;
pub mod error;
pub mod labeling;
pub mod observer;
pub mod repository;
pub mod store;
pub mod types;
pub mod vector;

#[cfg(feature = "server")]
pub mod server;

pub use assign::{AssignmentDecision, Candidate, IncrementalAssigner, PassOneOutcome, processing_order};
pub use config::{
    AppConfig, ClusteringConfig, ConfigLoadError, LabelerKind, NamingConfig, NamingPolicy,
    ServerConfig, StorageBackend, StorageConfig,
};
pub use density::{DensityClusterer, DensityOutcome, DensityParams};
pub use diagnostics::{
    CountsSnapshot, DiagnosticsRecord, ItemDecision, MemberTitle, NewClusterReport, RunDiagnostics,
};
pub use discover::{ClusterDiscoverer, DiscoveryOutcome, NewCluster};
pub use engine::{ClusteringOrchestrator, RunOutput};
pub use error::ClusterError;
pub use labeling::{
    KeywordLabeler, LabelFailure, LabelReport, Labeler, LabelingError, MemberSummary,
    label_clusters,
};
#[cfg(feature = "http-labeler")]
pub use labeling::HttpLabeler;
pub use observer::{RunMetrics, RunStats, set_run_metrics};
pub use repository::{ClusterRepository, InMemoryRepository, JsonFileRepository, RepositoryError};
pub use store::ClusterStore;
pub use types::{
    Cluster, ClusterId, ClusterRecord, ClusterSnapshot, ClusterStatus, Item, ItemId,
    SNAPSHOT_VERSION,
};
pub use vector::{
    CentroidAccumulator, Embedding, centroid, cosine_distance, cosine_similarity,
    epsilon_for_similarity,
};
