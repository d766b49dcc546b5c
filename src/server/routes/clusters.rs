//! Cluster endpoints.
//!
//! Every write runs load, restore, mutate, save under the state's single
//! writer lock, so two requests never race on the persisted snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{NamingConfig, NamingPolicy};
use crate::diagnostics::DiagnosticsRecord;
use crate::labeling::{LabelReport, label_clusters};
use crate::server::error::{ServerError, ServerResult};
use crate::server::routes::ApiJson;
use crate::server::state::ServerState;
use crate::store::ClusterStore;
use crate::types::{ClusterRecord, ClusterSnapshot, Item, ItemId};
use crate::vector::Embedding;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterListResponse {
    pub dimension: usize,
    pub total: usize,
    pub clusters: Vec<ClusterRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclusterRequest {
    /// Full current item set; members of existing clusters are recognised
    /// and skipped.
    pub items: Vec<Item>,
    /// Timestamp for created and updated clusters; defaults to now.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    /// Run naming after clustering.
    #[serde(default = "default_true")]
    pub label: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclusterResponse {
    pub diagnostics: DiagnosticsRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelReport>,
    pub clusters: Vec<ClusterRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRequest {
    pub items: Vec<Item>,
    /// Overrides `naming.policy` for this call.
    #[serde(default)]
    pub policy: Option<NamingPolicy>,
}

fn default_true() -> bool {
    true
}

/// List persisted clusters in creation order, centroids omitted.
pub async fn list_clusters(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<Json<ClusterListResponse>> {
    let snapshot = load_snapshot(&state).await?;
    let clusters = public_records(&snapshot);
    Ok(Json(ClusterListResponse {
        dimension: snapshot.dimension,
        total: clusters.len(),
        clusters,
    }))
}

/// Run both passes over the posted items, persist, then name clusters.
///
/// Clustering is saved before naming starts; a naming failure only shows up
/// in the `labels` report.
pub async fn recluster(
    State(state): State<Arc<ServerState>>,
    ApiJson(request): ApiJson<ReclusterRequest>,
) -> ServerResult<Json<ReclusterResponse>> {
    let _writer = state.writer.lock().await;

    let snapshot = load_snapshot(&state).await?;
    let items = Arc::new(request.items);
    let now = request.now.unwrap_or_else(Utc::now);

    let output = {
        let state = state.clone();
        let items = items.clone();
        tokio::task::spawn_blocking(move || {
            let store = restore(&state, &snapshot, &items)?;
            Ok::<_, ServerError>(state.orchestrator.run(&store, &items, now)?)
        })
        .await??
    };
    state.repository.save(&output.store.snapshot()).await?;

    let mut store = output.store;
    let labels = if request.label {
        Some(label_and_save(&state, &mut store, &items, &state.config.naming).await?)
    } else {
        None
    };

    Ok(Json(ReclusterResponse {
        diagnostics: output.diagnostics.to_record(),
        labels,
        clusters: public_records(&store.snapshot()),
    }))
}

/// Retry naming without re-running clustering.
pub async fn label(
    State(state): State<Arc<ServerState>>,
    ApiJson(request): ApiJson<LabelRequest>,
) -> ServerResult<Json<LabelReport>> {
    let _writer = state.writer.lock().await;

    let snapshot = load_snapshot(&state).await?;
    let mut store = restore(&state, &snapshot, &request.items)?;

    let mut naming = state.config.naming.clone();
    if let Some(policy) = request.policy {
        naming.policy = policy;
    }
    let report = label_and_save(&state, &mut store, &request.items, &naming).await?;
    Ok(Json(report))
}

async fn label_and_save(
    state: &ServerState,
    store: &mut ClusterStore,
    items: &[Item],
    naming: &NamingConfig,
) -> ServerResult<LabelReport> {
    let report = label_clusters(store, items, state.labeler.as_ref(), naming).await;
    if !report.named.is_empty() {
        state.repository.save(&store.snapshot()).await?;
    }
    Ok(report)
}

async fn load_snapshot(state: &ServerState) -> ServerResult<ClusterSnapshot> {
    Ok(state
        .repository
        .load()
        .await?
        .unwrap_or_else(|| ClusterSnapshot::empty(state.config.clustering.dimension)))
}

fn restore(
    state: &ServerState,
    snapshot: &ClusterSnapshot,
    items: &[Item],
) -> ServerResult<ClusterStore> {
    let embeddings: HashMap<ItemId, Embedding> = items
        .iter()
        .filter_map(|item| item.embedding.clone().map(|e| (item.id.clone(), e)))
        .collect();
    Ok(ClusterStore::restore(
        &state.config.clustering,
        snapshot,
        &embeddings,
    )?)
}

fn public_records(snapshot: &ClusterSnapshot) -> Vec<ClusterRecord> {
    snapshot
        .clusters
        .iter()
        .cloned()
        .map(|record| ClusterRecord {
            centroid: None,
            ..record
        })
        .collect()
}
