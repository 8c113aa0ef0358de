//! Orchestrator for the layered ingestion run.
//!
//! Recreates the target indices up front, fans the layer pipelines out with
//! bounded parallelism, isolates per-layer failures, and finalizes settings
//! and counts once loading is done.

use std::sync::Arc;

use tokio::sync::{broadcast, Semaphore};
use tracing::{error, info, instrument, warn};

use crate::converter::{DecodePolicy, FeatureSource};
use crate::errors::PipelineError;
use crate::loader::LoaderConfig;
use crate::pipeline::{LayerPipeline, PipelineConfig};
use osm_indexer_repository::{IndexStore, IndexStoreError};
use osm_indexer_shared::{Layer, LayerRunResult, LayerState, RunReport};

/// Configuration for one ingestion run.
///
/// Assembled once at process start and threaded through the orchestrator
/// explicitly; nothing here is read from ambient global state.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Index name prefix, the first segment of every target index name.
    pub index_prefix: String,
    /// Task (area) identifier, the middle segment of target index names.
    pub task: String,
    /// Maximum number of layer pipelines running concurrently.
    pub workers: usize,
    /// Replica count restored after a layer completes loading.
    pub target_replicas: u32,
    /// Replica count used while loading, kept low for write throughput.
    pub load_replicas: u32,
    /// Decode-failure policy for the converter.
    pub decode_policy: DecodePolicy,
    /// Loader batching and retry settings.
    pub loader: LoaderConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            index_prefix: "openstreetmap".to_string(),
            task: "planet".to_string(),
            workers: 1,
            target_replicas: 0,
            load_replicas: 0,
            decode_policy: DecodePolicy::default(),
            loader: LoaderConfig::default(),
        }
    }
}

/// Orchestrator that runs all five layer pipelines for one task.
///
/// The orchestrator:
/// - Deletes stale index generations sequentially before anything starts
/// - Runs layer pipelines concurrently under a worker-count bound
/// - Never cancels sibling layers when one fails
/// - Restores replica counts and collects document counts afterwards
pub struct IngestionOrchestrator {
    store: Arc<dyn IndexStore>,
    source: Arc<dyn FeatureSource>,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl IngestionOrchestrator {
    /// Create a new orchestrator over the given store and source.
    pub fn new(
        store: Arc<dyn IndexStore>,
        source: Arc<dyn FeatureSource>,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            store,
            source,
            config,
            shutdown_tx,
        }
    }

    /// Trigger a graceful shutdown.
    ///
    /// In-flight batch submissions complete or fail naturally; no further
    /// batches start, and layers not yet started remain `Pending`.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the full layered ingestion and produce the run report.
    #[instrument(skip(self), fields(prefix = %self.config.index_prefix, task = %self.config.task))]
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        info!(workers = self.config.workers, "Starting layered ingestion run");

        // Recreate protocol, phase one: sequential deletes, never racing
        // engine metadata operations for the same index.
        for layer in Layer::ALL {
            let index = self.index_name(layer);
            self.store.delete_if_exists(&index).await?;
        }

        // Forward Ctrl-C into the shutdown channel
        let signal_shutdown = self.shutdown_tx.clone();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                let _ = signal_shutdown.send(());
            }
        });

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut handles = Vec::with_capacity(Layer::ALL.len());

        for layer in Layer::ALL {
            let pipeline = LayerPipeline::new(
                Arc::clone(&self.store),
                Arc::clone(&self.source),
                PipelineConfig {
                    decode_policy: self.config.decode_policy,
                    loader: self.config.loader.clone(),
                    load_replicas: self.config.load_replicas,
                },
                layer,
                self.index_name(layer),
            );
            let semaphore = Arc::clone(&semaphore);
            let mut queue_shutdown = self.shutdown_tx.subscribe();
            let pipeline_shutdown = self.shutdown_tx.subscribe();

            let handle = tokio::spawn(async move {
                // Shutdown wins over a freed permit: a layer that has not
                // started stays pending.
                let _permit = tokio::select! {
                    biased;
                    _ = queue_shutdown.recv() => {
                        info!(layer = %layer, "Shutdown before layer started");
                        return LayerRunResult::pending(layer);
                    }
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return LayerRunResult::failed(layer, "worker pool closed"),
                    },
                };
                pipeline.run(pipeline_shutdown).await
            });
            handles.push((layer, handle));
        }

        // A layer failure never cancels siblings; every handle is awaited.
        let mut results = Vec::with_capacity(Layer::ALL.len());
        for (layer, handle) in handles {
            match handle.await {
                Ok(result) => {
                    info!(
                        layer = %layer,
                        state = ?result.state,
                        indexed = result.indexed,
                        skipped = result.skipped,
                        "Layer finished"
                    );
                    results.push(result);
                }
                Err(join_error) => {
                    error!(layer = %layer, error = %join_error, "Layer task aborted");
                    results.push(LayerRunResult::failed(
                        layer,
                        format!("layer task aborted: {}", join_error),
                    ));
                }
            }
        }
        signal_task.abort();

        let mut finalized = Vec::with_capacity(results.len());
        for result in results {
            finalized.push(self.finalize_layer(result).await);
        }

        Ok(RunReport { layers: finalized })
    }

    /// Restore settings and collect the engine count for a completed layer.
    async fn finalize_layer(&self, result: LayerRunResult) -> LayerRunResult {
        if result.state != LayerState::Completed {
            return result;
        }
        let index = self.index_name(result.layer);

        if let Err(error) = self
            .store
            .update_settings(&index, self.config.target_replicas)
            .await
        {
            match error {
                IndexStoreError::IndexNotFound(_) => {
                    error!(index = %index, error = %error, "Index vanished before settings restore");
                    return LayerRunResult {
                        state: LayerState::Failed,
                        error: Some(error.to_string()),
                        ..result
                    };
                }
                other => {
                    // The data is loaded; a settings restore can be re-run by hand
                    warn!(index = %index, error = %other, "Failed to restore replica count");
                }
            }
        }

        // Reporting is best-effort
        let final_count = match self.store.count(&index).await {
            Ok(count) => Some(count),
            Err(error) => {
                warn!(index = %index, error = %error, "Count request failed");
                None
            }
        };

        LayerRunResult {
            final_count,
            ..result
        }
    }

    fn index_name(&self, layer: Layer) -> String {
        layer.index_name(&self.config.index_prefix, &self.config.task)
    }
}
