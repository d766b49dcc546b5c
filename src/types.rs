//! Core data model shared by every stage of the engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vector::Embedding;

/// Bump this value whenever the persisted `ClusterSnapshot` layout changes.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Stable identifier of an article.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClusterId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClusterId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An aggregated article as seen by the engine.
///
/// Only items with an embedding of the store's dimension take part in
/// clustering; items without one are filtered before either pass runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    /// Comma-separated keywords extracted upstream.
    #[serde(default)]
    pub keywords: String,
    /// Publication time; drives the Pass 1 processing order.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub embedding: Option<Embedding>,
}

impl Item {
    pub fn new(id: impl Into<ItemId>, embedding: Option<Embedding>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            excerpt: String::new(),
            keywords: String::new(),
            published_at: None,
            embedding,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = excerpt.into();
        self
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = keywords.into();
        self
    }

    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}

/// Lifecycle state of a cluster. The engine only ever produces `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    #[default]
    Active,
    Archived,
}

/// In-memory cluster. Mutated only through [`crate::ClusterStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub(crate) id: ClusterId,
    pub(crate) name: Option<String>,
    pub(crate) member_ids: Vec<ItemId>,
    pub(crate) centroid: Embedding,
    pub(crate) status: ClusterStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    /// Running f64 sum of member embeddings; `centroid = sum / len`.
    pub(crate) sum: Vec<f64>,
}

impl Cluster {
    pub fn id(&self) -> &ClusterId {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Member ids in insertion order.
    pub fn member_ids(&self) -> &[ItemId] {
        &self.member_ids
    }

    pub fn centroid(&self) -> &Embedding {
        &self.centroid
    }

    pub fn status(&self) -> ClusterStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ClusterStatus::Active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    pub fn contains(&self, item: &ItemId) -> bool {
        self.member_ids.contains(item)
    }

    pub fn to_record(&self) -> ClusterRecord {
        ClusterRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            article_ids: self.member_ids.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            centroid: Some(self.centroid.clone()),
        }
    }
}

/// Persisted cluster shape.
///
/// The centroid is optional: it can always be recomputed from member
/// embeddings on load, storing it only saves that work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub name: Option<String>,
    pub article_ids: Vec<ItemId>,
    #[serde(default)]
    pub status: ClusterStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Embedding>,
}

/// Everything a repository loads or saves in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    #[serde(default = "default_snapshot_version")]
    pub version: u16,
    pub dimension: usize,
    pub clusters: Vec<ClusterRecord>,
}

impl ClusterSnapshot {
    pub fn empty(dimension: usize) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dimension,
            clusters: Vec::new(),
        }
    }
}

const fn default_snapshot_version() -> u16 {
    SNAPSHOT_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_deserializes_from_camel_case() {
        let json = r#"{
            "id": "a-1",
            "title": "Retraites",
            "keywords": "retraites, grève",
            "publishedAt": "2025-01-01T08:00:00Z",
            "embedding": [1.0, 0.0]
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.id.as_str(), "a-1");
        assert_eq!(item.excerpt, "");
        assert!(item.published_at.is_some());
        assert_eq!(item.embedding.unwrap().dim(), 2);
    }

    #[test]
    fn item_without_embedding_is_accepted() {
        let item: Item = serde_json::from_str(r#"{"id": "a-2"}"#).unwrap();
        assert!(item.embedding.is_none());
    }

    #[test]
    fn record_uses_article_ids_key() {
        let at = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = ClusterRecord {
            id: ClusterId::from("c-1"),
            name: None,
            article_ids: vec![ItemId::from("a"), ItemId::from("b")],
            status: ClusterStatus::Active,
            created_at: at,
            updated_at: at,
            centroid: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["articleIds"][1], "b");
        assert_eq!(value["status"], "active");
        assert!(value["name"].is_null());
        assert!(value.get("centroid").is_none());
    }
}
