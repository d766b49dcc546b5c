//! In-memory cluster set.
//!
//! The store owns every invariant of the cluster model: centroids track the
//! mean of their members, no cluster exceeds `max_cluster_size`, and an item
//! belongs to at most one active cluster. Persistence is someone else's job;
//! see [`crate::repository`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::ClusteringConfig;
use crate::error::ClusterError;
use crate::types::{
    Cluster, ClusterId, ClusterRecord, ClusterSnapshot, ClusterStatus, ItemId, SNAPSHOT_VERSION,
};
use crate::vector::{CentroidAccumulator, Embedding};

/// Namespace for deterministic cluster ids (UUIDv5 over the founding members).
const CLUSTER_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5f1c_2a7e_93d4_4b0e_8c61_7d2e_0a9b_c4f3);

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStore {
    dimension: usize,
    max_cluster_size: usize,
    /// Creation order; ties in Pass 1 resolve toward lower positions.
    clusters: Vec<Cluster>,
    positions: HashMap<ClusterId, usize>,
    /// Active membership only.
    membership: HashMap<ItemId, ClusterId>,
}

impl ClusterStore {
    pub fn new(dimension: usize, max_cluster_size: usize) -> Self {
        Self {
            dimension,
            max_cluster_size,
            clusters: Vec::new(),
            positions: HashMap::new(),
            membership: HashMap::new(),
        }
    }

    pub fn from_config(cfg: &ClusteringConfig) -> Self {
        Self::new(cfg.dimension, cfg.max_cluster_size)
    }

    /// Rebuild a store from a persisted snapshot.
    ///
    /// Active centroids are recomputed from `embeddings` when every member is
    /// present there; otherwise the persisted centroid is used.
    pub fn restore(
        cfg: &ClusteringConfig,
        snapshot: &ClusterSnapshot,
        embeddings: &HashMap<ItemId, Embedding>,
    ) -> Result<Self, ClusterError> {
        if snapshot.dimension != cfg.dimension {
            return Err(ClusterError::DimensionMismatch {
                expected: cfg.dimension,
                got: snapshot.dimension,
            });
        }

        let mut store = Self::from_config(cfg);
        for record in &snapshot.clusters {
            store.restore_record(record, embeddings)?;
        }

        tracing::debug!(
            clusters = store.clusters.len(),
            active = store.active_count(),
            members = store.membership.len(),
            "cluster store restored"
        );
        Ok(store)
    }

    fn restore_record(
        &mut self,
        record: &ClusterRecord,
        embeddings: &HashMap<ItemId, Embedding>,
    ) -> Result<(), ClusterError> {
        if self.positions.contains_key(&record.id) {
            return Err(ClusterError::DuplicateCluster(record.id.clone()));
        }
        if let Some(c) = &record.centroid {
            c.check_dim(self.dimension)?;
        }

        let active = record.status == ClusterStatus::Active;
        if active {
            if record.article_ids.is_empty() {
                return Err(ClusterError::EmptyInput);
            }
            if record.article_ids.len() > self.max_cluster_size {
                return Err(ClusterError::CapacityExceeded {
                    cluster_id: record.id.clone(),
                    size: record.article_ids.len(),
                    max: self.max_cluster_size,
                });
            }
            for (i, item) in record.article_ids.iter().enumerate() {
                let clash = self
                    .membership
                    .get(item)
                    .cloned()
                    .or_else(|| record.article_ids[..i].contains(item).then(|| record.id.clone()));
                if let Some(cluster_id) = clash {
                    return Err(ClusterError::AlreadyClustered {
                        item_id: item.clone(),
                        cluster_id,
                    });
                }
            }
        }

        let acc = self.restore_accumulator(record, embeddings, active)?;
        let centroid = acc.centroid()?;

        if active {
            for item in &record.article_ids {
                self.membership.insert(item.clone(), record.id.clone());
            }
        }
        self.positions.insert(record.id.clone(), self.clusters.len());
        self.clusters.push(Cluster {
            id: record.id.clone(),
            name: record.name.clone(),
            member_ids: record.article_ids.clone(),
            centroid,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            sum: acc.into_sum(),
        });
        Ok(())
    }

    fn restore_accumulator(
        &self,
        record: &ClusterRecord,
        embeddings: &HashMap<ItemId, Embedding>,
        active: bool,
    ) -> Result<CentroidAccumulator, ClusterError> {
        let missing = record
            .article_ids
            .iter()
            .find(|id| !embeddings.contains_key(*id));

        match (missing, &record.centroid) {
            (None, _) if !record.article_ids.is_empty() => {
                let mut acc = CentroidAccumulator::new(self.dimension);
                for id in &record.article_ids {
                    if let Some(v) = embeddings.get(id) {
                        acc.push(v)?;
                    }
                }
                Ok(acc)
            }
            (_, Some(c)) => Ok(CentroidAccumulator::from_mean(
                c,
                record.article_ids.len().max(1),
            )),
            (Some(item_id), None) if active => Err(ClusterError::MissingMemberEmbedding {
                cluster_id: record.id.clone(),
                item_id: item_id.clone(),
            }),
            // Archived and unrecoverable: keep a zero centroid, it never takes
            // part in either pass.
            _ => {
                let zero = Embedding::new(vec![0.0; self.dimension])?;
                Ok(CentroidAccumulator::from_mean(&zero, 1))
            }
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn max_cluster_size(&self) -> usize {
        self.max_cluster_size
    }

    /// Active clusters in creation order.
    pub fn all_active(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(|c| c.is_active())
    }

    /// Every cluster, archived included, in creation order.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn get(&self, id: &ClusterId) -> Option<&Cluster> {
        self.positions.get(id).map(|&pos| &self.clusters[pos])
    }

    pub fn size(&self, id: &ClusterId) -> Result<usize, ClusterError> {
        self.get(id)
            .map(Cluster::len)
            .ok_or_else(|| ClusterError::ClusterNotFound(id.clone()))
    }

    /// Active cluster the item belongs to, if any.
    pub fn cluster_of(&self, item: &ItemId) -> Option<&ClusterId> {
        self.membership.get(item)
    }

    pub fn is_clustered(&self, item: &ItemId) -> bool {
        self.membership.contains_key(item)
    }

    pub fn active_count(&self) -> usize {
        self.all_active().count()
    }

    pub fn clustered_item_count(&self) -> usize {
        self.membership.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Mint a new active cluster from its founding members.
    ///
    /// The id is derived from the member ids, so the same founding set always
    /// yields the same cluster id.
    pub fn create_cluster(
        &mut self,
        members: &[(ItemId, &Embedding)],
        now: DateTime<Utc>,
    ) -> Result<ClusterId, ClusterError> {
        if members.is_empty() {
            return Err(ClusterError::EmptyInput);
        }

        let id = self.fresh_cluster_id(members);
        if members.len() > self.max_cluster_size {
            return Err(ClusterError::CapacityExceeded {
                cluster_id: id,
                size: members.len(),
                max: self.max_cluster_size,
            });
        }

        let mut acc = CentroidAccumulator::new(self.dimension);
        for (i, (item, vector)) in members.iter().enumerate() {
            if let Some(owner) = self.membership.get(item) {
                return Err(ClusterError::AlreadyClustered {
                    item_id: item.clone(),
                    cluster_id: owner.clone(),
                });
            }
            if members[..i].iter().any(|(other, _)| other == item) {
                return Err(ClusterError::AlreadyClustered {
                    item_id: item.clone(),
                    cluster_id: id,
                });
            }
            acc.push(vector)?;
        }
        let centroid = acc.centroid()?;

        let member_ids: Vec<ItemId> = members.iter().map(|(id, _)| id.clone()).collect();
        for item in &member_ids {
            self.membership.insert(item.clone(), id.clone());
        }
        self.positions.insert(id.clone(), self.clusters.len());
        self.clusters.push(Cluster {
            id: id.clone(),
            name: None,
            member_ids,
            centroid,
            status: ClusterStatus::Active,
            created_at: now,
            updated_at: now,
            sum: acc.into_sum(),
        });

        tracing::debug!(cluster = %id, size = members.len(), "cluster created");
        Ok(id)
    }

    /// Derived id for a founding set, salted past any id already in the store
    /// (an archived cluster may have been founded by the same items).
    fn fresh_cluster_id(&self, members: &[(ItemId, &Embedding)]) -> ClusterId {
        let mut salt = 0u32;
        loop {
            let id = derive_cluster_id(members.iter().map(|(id, _)| id), salt);
            if !self.positions.contains_key(&id) {
                return id;
            }
            salt += 1;
        }
    }

    /// Append a member and recompute the centroid.
    ///
    /// Callers check capacity first; hitting `CapacityExceeded` here means the
    /// calling sequence is wrong.
    pub fn add_member(
        &mut self,
        cluster_id: &ClusterId,
        item_id: ItemId,
        vector: &Embedding,
        now: DateTime<Utc>,
    ) -> Result<(), ClusterError> {
        let pos = *self
            .positions
            .get(cluster_id)
            .ok_or_else(|| ClusterError::ClusterNotFound(cluster_id.clone()))?;
        vector.check_dim(self.dimension)?;
        if let Some(owner) = self.membership.get(&item_id) {
            return Err(ClusterError::AlreadyClustered {
                item_id,
                cluster_id: owner.clone(),
            });
        }

        let cluster = &mut self.clusters[pos];
        if !cluster.is_active() {
            return Err(ClusterError::ClusterNotFound(cluster_id.clone()));
        }
        if cluster.len() + 1 > self.max_cluster_size {
            return Err(ClusterError::CapacityExceeded {
                cluster_id: cluster_id.clone(),
                size: cluster.len(),
                max: self.max_cluster_size,
            });
        }

        let mut acc = CentroidAccumulator::from_parts(std::mem::take(&mut cluster.sum), cluster.len());
        acc.push(vector)?;
        cluster.centroid = acc.centroid()?;
        cluster.sum = acc.into_sum();
        cluster.member_ids.push(item_id.clone());
        cluster.updated_at = now;

        self.membership.insert(item_id, cluster_id.clone());
        Ok(())
    }

    /// Replace a cluster's display name. Membership is untouched.
    pub fn set_name(
        &mut self,
        cluster_id: &ClusterId,
        name: Option<String>,
    ) -> Result<(), ClusterError> {
        let pos = *self
            .positions
            .get(cluster_id)
            .ok_or_else(|| ClusterError::ClusterNotFound(cluster_id.clone()))?;
        self.clusters[pos].name = name;
        Ok(())
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension,
            clusters: self.clusters.iter().map(Cluster::to_record).collect(),
        }
    }
}

fn derive_cluster_id<'a>(members: impl Iterator<Item = &'a ItemId>, salt: u32) -> ClusterId {
    let mut material = Vec::new();
    for (i, id) in members.enumerate() {
        if i > 0 {
            material.push(0x1f);
        }
        material.extend_from_slice(id.as_str().as_bytes());
    }
    if salt > 0 {
        material.push(0x1e);
        material.extend_from_slice(&salt.to_be_bytes());
    }
    ClusterId::new(Uuid::new_v5(&CLUSTER_ID_NAMESPACE, &material).to_string())
}
