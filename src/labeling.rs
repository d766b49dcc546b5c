//! Cluster naming.
//!
//! Naming is an enrichment on top of clustering: a labeler failure leaves the
//! cluster's name as it was and never touches membership. Labelers are
//! injected through the [`Labeler`] trait; [`KeywordLabeler`] works offline
//! and `HttpLabeler` (feature `http-labeler`) delegates to a naming service.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{NamingConfig, NamingPolicy};
use crate::store::ClusterStore;
use crate::types::{ClusterId, Item, ItemId};

/// What a labeler gets to see of one cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub title: String,
    pub excerpt: String,
    /// Comma-separated keywords; not sent to remote labelers.
    #[serde(skip)]
    pub keywords: String,
}

impl MemberSummary {
    pub fn from_item(item: &Item) -> Self {
        Self {
            title: item.title.clone(),
            excerpt: item.excerpt.clone(),
            keywords: item.keywords.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelingError {
    #[error("no member carries keywords")]
    NoKeywords,
    #[error("no member summaries available")]
    NoMembers,
    #[error("labeler returned an empty name")]
    EmptyName,
    #[error("labeling timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("labeling transport error: {0}")]
    Transport(String),
    #[error("labeler response could not be decoded: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait Labeler: Send + Sync {
    async fn name(&self, members: &[MemberSummary]) -> Result<String, LabelingError>;
}

/// Names a cluster after its most frequent member keywords.
///
/// Keywords are compared case-insensitively; the spelling of the first
/// occurrence is kept. Equal counts keep first-seen order.
#[derive(Debug, Clone, Copy)]
pub struct KeywordLabeler {
    top: usize,
}

impl KeywordLabeler {
    pub fn new(top: usize) -> Self {
        Self { top: top.max(1) }
    }

    pub fn label(&self, members: &[MemberSummary]) -> Result<String, LabelingError> {
        // (display form, count) in first-seen order.
        let mut counts: Vec<(&str, usize)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for member in members {
            for raw in member.keywords.split(',') {
                let keyword = raw.trim();
                if keyword.is_empty() {
                    continue;
                }
                let key = keyword.to_lowercase();
                match index.get(&key) {
                    Some(&i) => counts[i].1 += 1,
                    None => {
                        index.insert(key, counts.len());
                        counts.push((keyword, 1));
                    }
                }
            }
        }

        if counts.is_empty() {
            return Err(LabelingError::NoKeywords);
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(counts
            .iter()
            .take(self.top)
            .map(|(k, _)| *k)
            .collect::<Vec<_>>()
            .join(", "))
    }
}

impl Default for KeywordLabeler {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl Labeler for KeywordLabeler {
    async fn name(&self, members: &[MemberSummary]) -> Result<String, LabelingError> {
        self.label(members)
    }
}

#[cfg(feature = "http-labeler")]
pub use remote::HttpLabeler;

#[cfg(feature = "http-labeler")]
mod remote {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use super::{Labeler, LabelingError, MemberSummary};

    #[derive(Serialize)]
    struct NameRequest<'a> {
        members: &'a [MemberSummary],
    }

    #[derive(Deserialize)]
    struct NameResponse {
        name: String,
    }

    /// Remote naming service: `POST {members: [{title, excerpt}]}` answered
    /// with `{name}`.
    #[derive(Debug, Clone)]
    pub struct HttpLabeler {
        client: reqwest::Client,
        endpoint: String,
    }

    impl HttpLabeler {
        pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, LabelingError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(5))
                .build()
                .map_err(|e| LabelingError::Transport(e.to_string()))?;
            Ok(Self {
                client,
                endpoint: endpoint.into(),
            })
        }
    }

    #[async_trait]
    impl Labeler for HttpLabeler {
        async fn name(&self, members: &[MemberSummary]) -> Result<String, LabelingError> {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&NameRequest { members })
                .send()
                .await
                .map_err(|e| LabelingError::Transport(e.to_string()))?
                .error_for_status()
                .map_err(|e| LabelingError::Transport(e.to_string()))?;

            let body: NameResponse = response
                .json()
                .await
                .map_err(|e| LabelingError::InvalidResponse(e.to_string()))?;
            Ok(body.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelFailure {
    pub cluster_id: ClusterId,
    pub error: String,
}

/// Outcome of one labeling sweep.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelReport {
    pub named: Vec<ClusterId>,
    /// Already named and kept under `PreserveExisting`.
    pub skipped: Vec<ClusterId>,
    pub failed: Vec<LabelFailure>,
}

/// Name active clusters in creation order according to `cfg.policy`.
///
/// Member summaries are taken from `items` in membership order, at most
/// `cfg.max_summaries` per cluster. Each labeler call is bounded by
/// `cfg.timeout()`.
pub async fn label_clusters(
    store: &mut ClusterStore,
    items: &[Item],
    labeler: &dyn Labeler,
    cfg: &NamingConfig,
) -> LabelReport {
    let by_id: HashMap<&ItemId, &Item> = items.iter().map(|i| (&i.id, i)).collect();
    let mut report = LabelReport::default();

    let targets: Vec<(ClusterId, Vec<MemberSummary>)> = store
        .all_active()
        .filter_map(|cluster| {
            if cfg.policy == NamingPolicy::PreserveExisting && cluster.name().is_some() {
                report.skipped.push(cluster.id().clone());
                return None;
            }
            let summaries = cluster
                .member_ids()
                .iter()
                .filter_map(|id| by_id.get(id))
                .take(cfg.max_summaries)
                .map(|item| MemberSummary::from_item(item))
                .collect();
            Some((cluster.id().clone(), summaries))
        })
        .collect();

    for (cluster_id, summaries) in targets {
        match name_one(labeler, &summaries, cfg).await {
            Ok(name) => match store.set_name(&cluster_id, Some(name)) {
                Ok(()) => report.named.push(cluster_id),
                Err(err) => report.failed.push(LabelFailure {
                    cluster_id,
                    error: err.to_string(),
                }),
            },
            Err(err) => {
                tracing::warn!(cluster = %cluster_id, error = %err, "cluster naming failed");
                report.failed.push(LabelFailure {
                    cluster_id,
                    error: err.to_string(),
                });
            }
        }
    }

    tracing::info!(
        named = report.named.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "labeling finished"
    );
    report
}

async fn name_one(
    labeler: &dyn Labeler,
    summaries: &[MemberSummary],
    cfg: &NamingConfig,
) -> Result<String, LabelingError> {
    if summaries.is_empty() {
        return Err(LabelingError::NoMembers);
    }
    let name = tokio::time::timeout(cfg.timeout(), labeler.name(summaries))
        .await
        .map_err(|_| LabelingError::Timeout(cfg.timeout()))??;

    let name = name.trim();
    if name.is_empty() {
        return Err(LabelingError::EmptyName);
    }
    Ok(name.to_string())
}
