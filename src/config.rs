//! YAML configuration for the clustering engine and its service wrapper.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "newsroom"
//!
//! clustering:
//!   dimension: 384
//!   similarity_threshold: 0.75
//!   discovery_epsilon: 0.25
//!   min_cluster_size: 2
//!   max_cluster_size: 50
//!   settle: true
//!
//! naming:
//!   policy: "preserve_existing"
//!   labeler: "keyword"
//!   timeout_secs: 10
//!   max_summaries: 8
//!
//! storage:
//!   backend: "json_file"
//!   path: "data/clusters.json"
//!
//! server:
//!   bind_addr: "0.0.0.0"
//!   port: 8080
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ClusterError;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Tunable engine parameters. These are inputs to every run, never constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Fixed embedding dimension for the lifetime of the store.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Pass 1 acceptance bound `τ` on cosine similarity to a centroid.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Pass 2 neighbourhood radius in cosine distance.
    #[serde(default = "default_discovery_epsilon")]
    pub discovery_epsilon: f32,

    /// Minimum members of a discovered cluster; also DBSCAN's `min_pts`.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    #[serde(default = "default_max_cluster_size")]
    pub max_cluster_size: usize,

    /// Repeat Pass 1 + Pass 2 over the remaining noise until nothing changes.
    #[serde(default = "true_value")]
    pub settle: bool,
}

impl ClusteringConfig {
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.dimension == 0 {
            return Err(ClusterError::InvalidConfig(
                "dimension must be >= 1".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ClusterError::InvalidConfig(format!(
                "similarity_threshold must be within [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=2.0).contains(&self.discovery_epsilon) {
            return Err(ClusterError::InvalidConfig(format!(
                "discovery_epsilon must be within [0, 2], got {}",
                self.discovery_epsilon
            )));
        }
        if self.min_cluster_size < 2 {
            return Err(ClusterError::InvalidConfig(
                "min_cluster_size must be >= 2".into(),
            ));
        }
        if self.max_cluster_size < self.min_cluster_size {
            return Err(ClusterError::InvalidConfig(format!(
                "max_cluster_size ({}) must be >= min_cluster_size ({})",
                self.max_cluster_size, self.min_cluster_size
            )));
        }
        Ok(())
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            similarity_threshold: default_similarity_threshold(),
            discovery_epsilon: default_discovery_epsilon(),
            min_cluster_size: default_min_cluster_size(),
            max_cluster_size: default_max_cluster_size(),
            settle: true,
        }
    }
}

/// What to do with clusters that already carry a name when labeling runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NamingPolicy {
    /// Only name clusters whose name is still `None`.
    #[default]
    PreserveExisting,
    /// Ask the labeler again for every active cluster.
    RegenerateAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LabelerKind {
    #[default]
    Keyword,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default)]
    pub policy: NamingPolicy,

    #[serde(default)]
    pub labeler: LabelerKind,

    /// Endpoint for `LabelerKind::Http`.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Per-cluster labeling timeout.
    #[serde(default = "default_label_timeout")]
    pub timeout_secs: u64,

    /// Members summarized per labeling call.
    #[serde(default = "default_max_summaries")]
    pub max_summaries: usize,

    /// Keywords joined into a keyword-derived name.
    #[serde(default = "default_keyword_count")]
    pub keyword_count: usize,
}

impl NamingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.labeler == LabelerKind::Http && self.endpoint.is_none() {
            return Err(ConfigLoadError::Validation(
                "naming.endpoint is required when labeler is 'http'".to_string(),
            ));
        }
        if self.max_summaries == 0 {
            return Err(ConfigLoadError::Validation(
                "naming.max_summaries must be >= 1".to_string(),
            ));
        }
        if self.keyword_count == 0 {
            return Err(ConfigLoadError::Validation(
                "naming.keyword_count must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            policy: NamingPolicy::default(),
            labeler: LabelerKind::default(),
            endpoint: None,
            timeout_secs: default_label_timeout(),
            max_summaries: default_max_summaries(),
            keyword_count: default_keyword_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    JsonFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.backend == StorageBackend::JsonFile && self.path.is_none() {
            return Err(ConfigLoadError::Validation(
                "storage.path is required when backend is 'json_file'".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP service settings. Only read by the `server` feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Accepted API keys; empty disables authentication.
    #[serde(default)]
    pub api_keys: Vec<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "true_value")]
    pub metrics_enabled: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigLoadError> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|e| ConfigLoadError::Validation(format!("invalid bind address: {e}")))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        self.socket_addr()?;
        if self.timeout_secs == 0 {
            return Err(ConfigLoadError::Validation(
                "server.timeout_secs must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            api_keys: Vec::new(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration format version
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub naming: NamingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.clustering
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;
        self.naming.validate()?;
        self.storage.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            clustering: ClusteringConfig::default(),
            naming: NamingConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

// Helper functions for serde defaults
fn default_dimension() -> usize {
    384
}
fn default_similarity_threshold() -> f32 {
    0.75
}
fn default_discovery_epsilon() -> f32 {
    0.25
}
fn default_min_cluster_size() -> usize {
    2
}
fn default_max_cluster_size() -> usize {
    50
}
fn true_value() -> bool {
    true
}
fn default_label_timeout() -> u64 {
    10
}
fn default_max_summaries() -> usize {
    8
}
fn default_keyword_count() -> usize {
    3
}
fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_body_size_mb() -> usize {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.clustering.dimension, 384);
        assert_eq!(config.clustering.similarity_threshold, 0.75);
        assert_eq!(config.clustering.min_cluster_size, 2);
        assert!(config.clustering.settle);
        assert_eq!(config.naming.policy, NamingPolicy::PreserveExisting);
    }

    #[test]
    fn test_load_valid_yaml() {
        let yaml = r#"
version: "1.0"
name: "newsroom"
clustering:
  dimension: 3
  similarity_threshold: 0.8
  max_cluster_size: 5
naming:
  policy: "regenerate_all"
storage:
  backend: "json_file"
  path: "/tmp/clusters.json"
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name.as_deref(), Some("newsroom"));
        assert_eq!(config.clustering.dimension, 3);
        assert_eq!(config.clustering.max_cluster_size, 5);
        assert_eq!(config.clustering.discovery_epsilon, 0.25);
        assert_eq!(config.naming.policy, NamingPolicy::RegenerateAll);
        assert_eq!(config.storage.backend, StorageBackend::JsonFile);
    }

    #[test]
    fn test_load_from_file() {
        let yaml = "version: \"1\"\nclustering:\n  dimension: 8\n";
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        let config = AppConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.clustering.dimension, 8);
    }

    #[test]
    fn test_unsupported_version() {
        let result = AppConfig::from_yaml("version: \"2.0\"\n");
        assert!(matches!(result, Err(ConfigLoadError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_min_cluster_size_validation() {
        let yaml = r#"
version: "1.0"
clustering:
  min_cluster_size: 1
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("min_cluster_size"));
    }

    #[test]
    fn test_capacity_below_minimum_rejected() {
        let cfg = ClusteringConfig {
            min_cluster_size: 4,
            max_cluster_size: 3,
            ..ClusteringConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_cluster_size"));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let cfg = ClusteringConfig {
            similarity_threshold: 1.5,
            ..ClusteringConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_json_file_requires_path() {
        let yaml = r#"
version: "1.0"
storage:
  backend: "json_file"
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("storage.path"));
    }

    #[test]
    fn test_http_labeler_requires_endpoint() {
        let yaml = r#"
version: "1.0"
naming:
  labeler: "http"
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("naming.endpoint"));
    }

    #[test]
    fn test_socket_addr() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }
}
