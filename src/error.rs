use thiserror::Error;

use crate::types::{ClusterId, ItemId};

/// Errors surfaced by the clustering engine.
///
/// Every variant is fatal for the run that produced it: the orchestrator
/// returns the error and the caller keeps its previous cluster set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClusterError {
    /// A vector's length disagrees with the store's fixed dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// An embedding carried a NaN or infinite component.
    #[error("embedding component {index} is not finite")]
    NonFiniteEmbedding { index: usize },
    /// Centroid requested over zero vectors.
    #[error("centroid of an empty vector set")]
    EmptyInput,
    /// Cluster id is not present in the store.
    #[error("cluster not found: {0}")]
    ClusterNotFound(ClusterId),
    /// Adding or creating would push a cluster past `max_cluster_size`.
    #[error("cluster {cluster_id} at capacity: size {size}, max {max}")]
    CapacityExceeded {
        cluster_id: ClusterId,
        size: usize,
        max: usize,
    },
    /// Item already belongs to an active cluster.
    #[error("item {item_id} already belongs to cluster {cluster_id}")]
    AlreadyClustered {
        item_id: ItemId,
        cluster_id: ClusterId,
    },
    /// Two clusters resolved to the same id.
    #[error("duplicate cluster id: {0}")]
    DuplicateCluster(ClusterId),
    /// The same item id appeared twice in one run's input.
    #[error("duplicate item id in input: {0}")]
    DuplicateItem(ItemId),
    /// A persisted cluster could not be restored: a member has no embedding
    /// and the record carries no centroid.
    #[error("cluster {cluster_id} has no centroid and member {item_id} has no embedding")]
    MissingMemberEmbedding {
        cluster_id: ClusterId,
        item_id: ItemId,
    },
    /// Engine parameters are inconsistent.
    #[error("invalid clustering config: {0}")]
    InvalidConfig(String),
}
