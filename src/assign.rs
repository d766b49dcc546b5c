//! Pass 1: greedy assignment of unclustered items to existing clusters.
//!
//! ## Processing order
//!
//! Items are evaluated most-recent-first: `published_at` descending, items
//! without a timestamp after every timestamped item, ties broken by `ItemId`
//! ascending. Order matters because an earlier item can fill a cluster to
//! capacity before a later item is evaluated.
//!
//! ## Best match
//!
//! Each item is compared with every active centroid. Equal similarities
//! resolve toward the earlier-created cluster. Only the best cluster is ever
//! considered: an item rejected because that cluster is full is not offered
//! to the runner-up.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClusterError;
use crate::store::ClusterStore;
use crate::types::{ClusterId, Item, ItemId};
use crate::vector::{Embedding, cosine_similarity};

/// An item that takes part in a run, paired with its (present) embedding.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub item: &'a Item,
    pub embedding: &'a Embedding,
}

impl<'a> Candidate<'a> {
    /// `None` when the item carries no embedding.
    pub fn from_item(item: &'a Item) -> Option<Self> {
        item.embedding
            .as_ref()
            .map(|embedding| Self { item, embedding })
    }

    pub fn id(&self) -> &'a ItemId {
        &self.item.id
    }
}

/// Outcome of evaluating one item against the cluster set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AssignmentDecision {
    #[serde(rename_all = "camelCase")]
    Assigned { cluster_id: ClusterId, similarity: f32 },
    /// Best similarity fell below the threshold. Both fields are `None` when
    /// there was no active cluster to compare against.
    #[serde(rename_all = "camelCase")]
    RejectedThreshold {
        nearest_cluster_id: Option<ClusterId>,
        similarity: Option<f32>,
        required_threshold: f32,
    },
    #[serde(rename_all = "camelCase")]
    RejectedFull {
        cluster_id: ClusterId,
        current_size: usize,
        max_size: usize,
    },
}

impl AssignmentDecision {
    pub fn is_assigned(&self) -> bool {
        matches!(self, AssignmentDecision::Assigned { .. })
    }
}

/// Ordering used by Pass 1: newest first, undated last, then by id.
pub fn processing_order(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    compare_published(a.item.published_at, b.item.published_at).then_with(|| a.id().cmp(b.id()))
}

fn compare_published(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Result of one Pass 1 sweep.
#[derive(Debug, Clone)]
pub struct PassOneOutcome<'a> {
    /// One decision per candidate, in processing order.
    pub decisions: Vec<(ItemId, AssignmentDecision)>,
    /// Candidates that were not assigned, in processing order.
    pub rejected: Vec<Candidate<'a>>,
}

impl PassOneOutcome<'_> {
    pub fn assigned_count(&self) -> usize {
        self.decisions.iter().filter(|(_, d)| d.is_assigned()).count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IncrementalAssigner {
    similarity_threshold: f32,
}

impl IncrementalAssigner {
    pub fn new(similarity_threshold: f32) -> Self {
        Self {
            similarity_threshold,
        }
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    /// Evaluate every candidate exactly once and add accepted ones to `store`.
    ///
    /// Candidates may come in any order; they are re-sorted with
    /// [`processing_order`] first.
    pub fn assign<'a>(
        &self,
        store: &mut ClusterStore,
        candidates: &[Candidate<'a>],
        now: DateTime<Utc>,
    ) -> Result<PassOneOutcome<'a>, ClusterError> {
        let mut ordered = candidates.to_vec();
        ordered.sort_by(processing_order);

        let mut decisions = Vec::with_capacity(ordered.len());
        let mut rejected = Vec::new();

        for candidate in ordered {
            candidate.embedding.check_dim(store.dimension())?;
            let decision = self.evaluate(store, candidate.embedding)?;

            if let AssignmentDecision::Assigned { cluster_id, .. } = &decision {
                store.add_member(cluster_id, candidate.id().clone(), candidate.embedding, now)?;
            } else {
                rejected.push(candidate);
            }

            tracing::debug!(item = %candidate.id(), ?decision, "pass 1 decision");
            decisions.push((candidate.id().clone(), decision));
        }

        Ok(PassOneOutcome {
            decisions,
            rejected,
        })
    }

    fn evaluate(
        &self,
        store: &ClusterStore,
        embedding: &Embedding,
    ) -> Result<AssignmentDecision, ClusterError> {
        let mut best: Option<(&ClusterId, usize, f32)> = None;
        for cluster in store.all_active() {
            let sim = cosine_similarity(embedding, cluster.centroid())?;
            // Strict comparison keeps the earlier-created cluster on ties.
            if best.is_none_or(|(_, _, top)| sim > top) {
                best = Some((cluster.id(), cluster.len(), sim));
            }
        }

        let Some((cluster_id, size, similarity)) = best else {
            return Ok(AssignmentDecision::RejectedThreshold {
                nearest_cluster_id: None,
                similarity: None,
                required_threshold: self.similarity_threshold,
            });
        };

        let decision = if similarity < self.similarity_threshold {
            AssignmentDecision::RejectedThreshold {
                nearest_cluster_id: Some(cluster_id.clone()),
                similarity: Some(similarity),
                required_threshold: self.similarity_threshold,
            }
        } else if size >= store.max_cluster_size() {
            AssignmentDecision::RejectedFull {
                cluster_id: cluster_id.clone(),
                current_size: size,
                max_size: store.max_cluster_size(),
            }
        } else {
            AssignmentDecision::Assigned {
                cluster_id: cluster_id.clone(),
                similarity,
            }
        };
        Ok(decision)
    }
}
