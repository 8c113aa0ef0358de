//! Dependency initialization and wiring for the indexer.

use std::sync::Arc;

use tracing::info;

use crate::config::RunConfig;
use crate::IndexingError;
use osm_indexer_pipeline::converter::PbfSource;
use osm_indexer_pipeline::loader::LoaderConfig;
use osm_indexer_pipeline::orchestrator::{IngestionOrchestrator, OrchestratorConfig};
use osm_indexer_repository::OpenSearchIndexStore;

/// Replica count used while loading; raised to the configured target after
/// each layer completes.
const LOAD_REPLICAS: u32 = 0;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: IngestionOrchestrator,
}

impl Dependencies {
    /// Initialize all dependencies from the run configuration.
    ///
    /// Validates the input file before any engine call, then wires the
    /// engine client, the PBF source, and the orchestrator.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If the input is missing or wiring fails
    pub async fn new(config: &RunConfig) -> Result<Self, IndexingError> {
        if !config.input_file.is_file() {
            return Err(IndexingError::InputMissing(config.input_file.clone()));
        }

        info!(
            input = %config.input_file.display(),
            es_url = %config.es_url,
            prefix = %config.index_prefix,
            task = %config.task,
            workers = config.workers,
            "Initializing dependencies"
        );

        let store = OpenSearchIndexStore::new(&config.es_url, &config.es_user, &config.es_pwd)
            .await
            .map_err(|e| {
                IndexingError::config(format!("Failed to create search engine client: {}", e))
            })?;

        let source = PbfSource::new(&config.input_file);

        let orchestrator_config = OrchestratorConfig {
            index_prefix: config.index_prefix.clone(),
            task: config.task.clone(),
            workers: config.workers,
            target_replicas: config.target_replicas,
            load_replicas: LOAD_REPLICAS,
            decode_policy: config.decode_policy,
            loader: LoaderConfig {
                batch_size: config.cache_size,
                ..LoaderConfig::default()
            },
        };

        let orchestrator = IngestionOrchestrator::new(
            Arc::new(store),
            Arc::new(source),
            orchestrator_config,
        );

        Ok(Self { orchestrator })
    }
}
