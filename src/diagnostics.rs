//! Per-run audit trail.
//!
//! [`RunDiagnostics`] is assembled by the orchestrator and never mutated after
//! it is returned. [`DiagnosticsRecord`] is the flattened, camelCase JSON
//! shape handed to reporting consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assign::AssignmentDecision;
use crate::types::{ClusterId, ItemId};

/// Counts taken before and after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountsSnapshot {
    /// Active clusters.
    pub clusters: usize,
    /// Items held by active clusters.
    pub clustered_items: usize,
    /// Input items with an embedding that no active cluster holds.
    pub noise: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDecision {
    /// Settle round the decision was taken in, starting at 1.
    pub round: usize,
    pub item_id: ItemId,
    pub decision: AssignmentDecision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTitle {
    pub id: ItemId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClusterReport {
    pub cluster_id: ClusterId,
    pub round: usize,
    pub members: Vec<MemberTitle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunDiagnostics {
    pub(crate) ran_at: DateTime<Utc>,
    pub(crate) before: CountsSnapshot,
    pub(crate) after: CountsSnapshot,
    pub(crate) skipped_without_embedding: usize,
    pub(crate) rounds: usize,
    pub(crate) decisions: Vec<ItemDecision>,
    pub(crate) new_clusters: Vec<NewClusterReport>,
    pub(crate) remaining_noise: Vec<ItemId>,
}

impl RunDiagnostics {
    pub fn ran_at(&self) -> DateTime<Utc> {
        self.ran_at
    }

    pub fn before(&self) -> CountsSnapshot {
        self.before
    }

    pub fn after(&self) -> CountsSnapshot {
        self.after
    }

    /// Input items dropped because they carried no embedding.
    pub fn skipped_without_embedding(&self) -> usize {
        self.skipped_without_embedding
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Every Pass 1 decision, in round then processing order.
    pub fn decisions(&self) -> &[ItemDecision] {
        &self.decisions
    }

    pub fn new_clusters(&self) -> &[NewClusterReport] {
        &self.new_clusters
    }

    pub fn remaining_noise(&self) -> &[ItemId] {
        &self.remaining_noise
    }

    pub fn assigned_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.decision.is_assigned())
            .count()
    }

    /// `true` when the run neither assigned an item nor created a cluster.
    pub fn is_quiescent(&self) -> bool {
        self.assigned_count() == 0 && self.new_clusters.is_empty()
    }

    pub fn to_record(&self) -> DiagnosticsRecord {
        let mut record = DiagnosticsRecord {
            ran_at: self.ran_at,
            before: self.before,
            after: self.after,
            skipped_without_embedding: self.skipped_without_embedding,
            rounds: self.rounds,
            assigned: Vec::new(),
            rejected_threshold: Vec::new(),
            rejected_full: Vec::new(),
            new_clusters: self.new_clusters.clone(),
            remaining_noise_count: self.remaining_noise.len(),
            remaining_noise_ids: self.remaining_noise.clone(),
        };

        for d in &self.decisions {
            match &d.decision {
                AssignmentDecision::Assigned {
                    cluster_id,
                    similarity,
                } => record.assigned.push(AssignedEntry {
                    round: d.round,
                    item_id: d.item_id.clone(),
                    cluster_id: cluster_id.clone(),
                    similarity: *similarity,
                }),
                AssignmentDecision::RejectedThreshold {
                    nearest_cluster_id,
                    similarity,
                    required_threshold,
                } => record.rejected_threshold.push(RejectedThresholdEntry {
                    round: d.round,
                    item_id: d.item_id.clone(),
                    nearest_cluster_id: nearest_cluster_id.clone(),
                    similarity: *similarity,
                    required_threshold: *required_threshold,
                }),
                AssignmentDecision::RejectedFull {
                    cluster_id,
                    current_size,
                    max_size,
                } => record.rejected_full.push(RejectedFullEntry {
                    round: d.round,
                    item_id: d.item_id.clone(),
                    cluster_id: cluster_id.clone(),
                    current_size: *current_size,
                    max_size: *max_size,
                }),
            }
        }

        // Largest first; stable sort keeps creation order among equals.
        record
            .new_clusters
            .sort_by(|a, b| b.members.len().cmp(&a.members.len()));
        record
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedEntry {
    pub round: usize,
    pub item_id: ItemId,
    pub cluster_id: ClusterId,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedThresholdEntry {
    pub round: usize,
    pub item_id: ItemId,
    pub nearest_cluster_id: Option<ClusterId>,
    pub similarity: Option<f32>,
    pub required_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedFullEntry {
    pub round: usize,
    pub item_id: ItemId,
    pub cluster_id: ClusterId,
    pub current_size: usize,
    pub max_size: usize,
}

/// External diagnostics shape, decisions partitioned by outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsRecord {
    pub ran_at: DateTime<Utc>,
    pub before: CountsSnapshot,
    pub after: CountsSnapshot,
    pub skipped_without_embedding: usize,
    pub rounds: usize,
    pub assigned: Vec<AssignedEntry>,
    pub rejected_threshold: Vec<RejectedThresholdEntry>,
    pub rejected_full: Vec<RejectedFullEntry>,
    pub new_clusters: Vec<NewClusterReport>,
    pub remaining_noise_count: usize,
    pub remaining_noise_ids: Vec<ItemId>,
}
