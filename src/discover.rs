//! Pass 2: mint new clusters from the items Pass 1 could not place.

use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::assign::Candidate;
use crate::density::{DensityClusterer, DensityParams};
use crate::error::ClusterError;
use crate::store::ClusterStore;
use crate::types::{ClusterId, ItemId};
use crate::vector::Embedding;

/// A cluster created by one discovery pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCluster {
    pub cluster_id: ClusterId,
    pub member_ids: Vec<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscoveryOutcome {
    /// In creation order.
    pub created: Vec<NewCluster>,
    /// Unclustered items, in the order they were handed in.
    pub noise: Vec<ItemId>,
}

#[derive(Debug, Clone)]
pub struct ClusterDiscoverer {
    density: DensityClusterer,
    min_cluster_size: usize,
}

impl ClusterDiscoverer {
    pub fn new(discovery_epsilon: f32, min_cluster_size: usize) -> Result<Self, ClusterError> {
        let density = DensityClusterer::new(DensityParams {
            epsilon: discovery_epsilon,
            min_pts: min_cluster_size,
        })?;
        Ok(Self {
            density,
            min_cluster_size,
        })
    }

    /// Run density clustering over `pending` in the given order and create one
    /// cluster per dense group. Existing clusters are never touched.
    ///
    /// A group larger than the store's capacity is cut into consecutive
    /// chunks sized within `[min_cluster_size, max_cluster_size]`; when the
    /// group cannot be covered that way, the tail that does not fit stays
    /// noise.
    pub fn discover(
        &self,
        store: &mut ClusterStore,
        pending: &[Candidate<'_>],
        now: DateTime<Utc>,
    ) -> Result<DiscoveryOutcome, ClusterError> {
        for candidate in pending {
            candidate.embedding.check_dim(store.dimension())?;
        }

        let vectors: Vec<&Embedding> = pending.iter().map(|c| c.embedding).collect();
        let groups = self.density.cluster_positions(&vectors)?;

        let mut created = Vec::new();
        for group in groups {
            let chunks =
                capacity_chunks(group.len(), self.min_cluster_size, store.max_cluster_size());
            let covered: usize = chunks.iter().map(|r| r.len()).sum();
            if covered < group.len() {
                tracing::debug!(
                    group = group.len(),
                    left_over = group.len() - covered,
                    "dense group does not fit the capacity bounds"
                );
            }

            for range in chunks {
                let members: Vec<(ItemId, &Embedding)> = group[range]
                    .iter()
                    .map(|&i| (pending[i].id().clone(), pending[i].embedding))
                    .collect();
                let cluster_id = store.create_cluster(&members, now)?;
                created.push(NewCluster {
                    cluster_id,
                    member_ids: members.into_iter().map(|(id, _)| id).collect(),
                });
            }
        }

        let noise = pending
            .iter()
            .map(|c| c.id())
            .filter(|id| !store.is_clustered(id))
            .cloned()
            .collect();

        Ok(DiscoveryOutcome { created, noise })
    }
}

/// Consecutive chunk ranges over a group of `n` items, each of length within
/// `[min, max]`.
///
/// With `k = ceil(n / max)` chunks, sizes differ by at most one when
/// `k * min <= n`. Otherwise no split covers the whole group: the result is
/// `n / min` chunks of `max` items and the tail is left out.
fn capacity_chunks(n: usize, min: usize, max: usize) -> Vec<Range<usize>> {
    if n < min || min > max || max == 0 {
        return Vec::new();
    }
    if n <= max {
        return vec![0..n];
    }

    let chunks = n.div_ceil(max);
    if chunks * min > n {
        return (0..n / min).map(|i| i * max..(i + 1) * max).collect();
    }

    let base = n / chunks;
    let extra = n % chunks;
    let mut out = Vec::with_capacity(chunks);
    let mut start = 0;
    for i in 0..chunks {
        let len = base + usize::from(i < extra);
        out.push(start..start + len);
        start += len;
    }
    out
}
