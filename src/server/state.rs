use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::Mutex;

use crate::config::{AppConfig, LabelerKind, StorageBackend};
use crate::engine::ClusteringOrchestrator;
use crate::labeling::{KeywordLabeler, Labeler};
use crate::repository::{ClusterRepository, InMemoryRepository, JsonFileRepository};

use super::error::{ServerError, ServerResult};

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<ClusteringOrchestrator>,
    pub repository: Arc<dyn ClusterRepository>,
    pub labeler: Arc<dyn Labeler>,
    /// Single writer: at most one load-run-save sequence in flight.
    pub writer: Arc<Mutex<()>>,
    /// Set when the Prometheus recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl ServerState {
    pub fn new(
        config: AppConfig,
        repository: Arc<dyn ClusterRepository>,
        labeler: Arc<dyn Labeler>,
        prometheus: Option<PrometheusHandle>,
    ) -> ServerResult<Self> {
        let orchestrator = ClusteringOrchestrator::new(config.clustering.clone())?;
        Ok(Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            repository,
            labeler,
            writer: Arc::new(Mutex::new(())),
            prometheus,
        })
    }

    /// Build repository and labeler from the `storage` and `naming` sections.
    pub fn from_config(
        config: AppConfig,
        prometheus: Option<PrometheusHandle>,
    ) -> ServerResult<Self> {
        let repository: Arc<dyn ClusterRepository> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryRepository::new()),
            StorageBackend::JsonFile => {
                let path = config.storage.path.clone().ok_or_else(|| {
                    ServerError::Config("storage.path is required for json_file".into())
                })?;
                Arc::new(JsonFileRepository::new(path))
            }
        };
        let labeler = build_labeler(&config)?;
        Self::new(config, repository, labeler, prometheus)
    }
}

fn build_labeler(config: &AppConfig) -> ServerResult<Arc<dyn Labeler>> {
    match config.naming.labeler {
        LabelerKind::Keyword => Ok(Arc::new(KeywordLabeler::new(config.naming.keyword_count))),
        #[cfg(feature = "http-labeler")]
        LabelerKind::Http => {
            let endpoint = config.naming.endpoint.clone().ok_or_else(|| {
                ServerError::Config("naming.endpoint is required for the http labeler".into())
            })?;
            let labeler = crate::labeling::HttpLabeler::new(endpoint, config.naming.timeout())?;
            Ok(Arc::new(labeler))
        }
        #[cfg(not(feature = "http-labeler"))]
        LabelerKind::Http => Err(ServerError::Config(
            "naming.labeler 'http' requires the http-labeler feature".into(),
        )),
    }
}
