//! Layer pipeline: one converter stream feeding one bulk loader.
//!
//! A pipeline owns a single layer end to end: it creates the target index,
//! runs conversion on a blocking task and loading on the async side
//! concurrently, and produces exactly one [`LayerRunResult`] on reaching a
//! terminal state.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{error, instrument};

use crate::converter::{ConvertSummary, DecodePolicy, FeatureSource, SourceError};
use crate::errors::PipelineError;
use crate::loader::{BulkLoader, LoadOutcome, LoadReport, LoaderConfig};
use osm_indexer_repository::opensearch::index_config;
use osm_indexer_repository::IndexStore;
use osm_indexer_shared::{Layer, LayerRunResult, LayerState};

/// Configuration for one layer pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Decode-failure policy for the converter.
    pub decode_policy: DecodePolicy,
    /// Loader batching and retry settings.
    pub loader: LoaderConfig,
    /// Replica count used while loading; the orchestrator raises it after
    /// the layer completes.
    pub load_replicas: u32,
}

/// Pipeline for a single layer.
///
/// State machine: `Pending -> Converting+Loading (concurrent) -> Completed |
/// Failed`. The pipeline moves to `Failed` on a decode error (fail-fast
/// policy), on exhausted bulk-submission attempts, or on cancellation;
/// otherwise it completes once the source is exhausted and the final batch
/// is flushed.
pub struct LayerPipeline {
    store: Arc<dyn IndexStore>,
    source: Arc<dyn FeatureSource>,
    config: PipelineConfig,
    layer: Layer,
    index: String,
}

impl LayerPipeline {
    /// Create a pipeline for `layer` targeting `index`.
    pub fn new(
        store: Arc<dyn IndexStore>,
        source: Arc<dyn FeatureSource>,
        config: PipelineConfig,
        layer: Layer,
        index: String,
    ) -> Self {
        Self {
            store,
            source,
            config,
            layer,
            index,
        }
    }

    /// Run the layer to a terminal state.
    ///
    /// The caller is responsible for having deleted any previous index
    /// generation; creation here fails on a pre-existing index.
    #[instrument(skip(self, shutdown), fields(layer = %self.layer, index = %self.index))]
    pub async fn run(&self, shutdown: broadcast::Receiver<()>) -> LayerRunResult {
        let mappings = index_config::layer_mappings(self.layer);
        if let Err(error) = self
            .store
            .create(&self.index, &mappings, self.config.load_replicas)
            .await
        {
            error!(error = %error, "Index creation failed");
            return LayerRunResult::failed(self.layer, error.to_string());
        }

        // Bounded channel: one batch of headroom between the producing
        // converter and the consuming loader.
        let (tx, rx) = mpsc::channel(self.config.loader.batch_size.max(1));

        let source = Arc::clone(&self.source);
        let layer = self.layer;
        let policy = self.config.decode_policy;
        let producer = tokio::task::spawn_blocking(move || source.read_layer(layer, policy, tx));

        let loader = BulkLoader::with_config(Arc::clone(&self.store), self.config.loader.clone());
        let load_report = loader.run(&self.index, rx, shutdown).await;

        // The loader has dropped its receiver by now, so a stalled producer
        // unblocks and returns.
        let convert_result = match producer.await {
            Ok(result) => result,
            Err(join_error) => {
                error!(error = %join_error, "Converter task aborted");
                Err(SourceError::Read(join_error.to_string()))
            }
        };

        self.finish(convert_result, load_report)
    }

    /// Assemble the terminal result from both halves of the pipeline.
    fn finish(
        &self,
        convert: Result<ConvertSummary, SourceError>,
        load: LoadReport,
    ) -> LayerRunResult {
        let (attempted, source_error) = match convert {
            Ok(summary) => (summary.attempted(), None),
            // The converter died mid-stream; only the loader's view remains
            Err(error) => (load.received, Some(error)),
        };

        let indexed = load.indexed;
        // Decode skips, per-document rejections, and (on failure paths)
        // documents that never reached the engine
        let skipped = attempted.saturating_sub(indexed);

        let (state, error) = match (load.outcome, source_error) {
            (LoadOutcome::Failed(load_error), _) => {
                (LayerState::Failed, Some(load_error.to_string()))
            }
            (LoadOutcome::Cancelled, _) => {
                (LayerState::Failed, Some(PipelineError::Cancelled.to_string()))
            }
            (LoadOutcome::Drained, Some(source_error)) => {
                (LayerState::Failed, Some(source_error.to_string()))
            }
            (LoadOutcome::Drained, None) => (LayerState::Completed, None),
        };

        LayerRunResult {
            layer: self.layer,
            state,
            attempted,
            indexed,
            skipped,
            final_count: None,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use osm_indexer_repository::{BulkOutcome, IndexStoreError};
    use osm_indexer_shared::FeatureDocument;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockIndexStore {
        create_error: Option<IndexStoreError>,
        bulk_calls: AtomicUsize,
    }

    impl MockIndexStore {
        fn new() -> Self {
            Self {
                create_error: None,
                bulk_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IndexStore for MockIndexStore {
        async fn exists(&self, _index: &str) -> Result<bool, IndexStoreError> {
            Ok(false)
        }

        async fn delete_if_exists(&self, _index: &str) -> Result<bool, IndexStoreError> {
            Ok(false)
        }

        async fn create(
            &self,
            _index: &str,
            _mappings: &Value,
            _replicas: u32,
        ) -> Result<(), IndexStoreError> {
            match &self.create_error {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }

        async fn update_settings(
            &self,
            _index: &str,
            _replicas: u32,
        ) -> Result<(), IndexStoreError> {
            Ok(())
        }

        async fn count(&self, _index: &str) -> Result<u64, IndexStoreError> {
            Ok(0)
        }

        async fn bulk_index(
            &self,
            _index: &str,
            documents: &[FeatureDocument],
        ) -> Result<BulkOutcome, IndexStoreError> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            Ok(BulkOutcome {
                indexed: documents.len() as u64,
                failed: 0,
            })
        }
    }

    struct MockSource {
        produced: u64,
        skipped: u64,
        decode_failure: bool,
        read_calls: AtomicUsize,
    }

    impl MockSource {
        fn with_documents(produced: u64) -> Self {
            Self {
                produced,
                skipped: 0,
                decode_failure: false,
                read_calls: AtomicUsize::new(0),
            }
        }
    }

    impl FeatureSource for MockSource {
        fn read_layer(
            &self,
            layer: Layer,
            policy: DecodePolicy,
            sink: mpsc::Sender<FeatureDocument>,
        ) -> Result<ConvertSummary, SourceError> {
            self.read_calls.fetch_add(1, Ordering::SeqCst);
            for id in 0..self.produced {
                if sink
                    .blocking_send(FeatureDocument::new("node", id as i64, 1))
                    .is_err()
                {
                    break;
                }
            }
            if self.decode_failure {
                assert_eq!(policy, DecodePolicy::Fail);
                return Err(SourceError::FeatureDecode {
                    layer,
                    element_id: 42,
                    message: "truncated geometry".to_string(),
                });
            }
            Ok(ConvertSummary {
                produced: self.produced,
                skipped: self.skipped,
            })
        }
    }

    fn pipeline(store: Arc<MockIndexStore>, source: Arc<MockSource>) -> LayerPipeline {
        let config = PipelineConfig {
            loader: LoaderConfig {
                batch_size: 3,
                max_attempts: 2,
                initial_retry_delay_ms: 1,
                max_retry_delay_ms: 2,
            },
            ..PipelineConfig::default()
        };
        LayerPipeline::new(
            store,
            source,
            config,
            Layer::Points,
            "osm_test_points".to_string(),
        )
    }

    /// A shutdown receiver that never fires (the sender is dropped; the
    /// loader disables its shutdown arm on a closed channel).
    fn shutdown_rx() -> broadcast::Receiver<()> {
        broadcast::channel(1).1
    }

    #[tokio::test]
    async fn test_completed_run() {
        let store = Arc::new(MockIndexStore::new());
        let source = Arc::new(MockSource::with_documents(7));

        let result = pipeline(store.clone(), source).run(shutdown_rx()).await;

        assert_eq!(result.state, LayerState::Completed);
        assert_eq!(result.attempted, 7);
        assert_eq!(result.indexed, 7);
        assert_eq!(result.skipped, 0);
        assert!(result.is_consistent());
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_decode_skips_counted() {
        let store = Arc::new(MockIndexStore::new());
        let source = Arc::new(MockSource {
            skipped: 2,
            ..MockSource::with_documents(3)
        });

        let result = pipeline(store, source).run(shutdown_rx()).await;

        assert_eq!(result.state, LayerState::Completed);
        assert_eq!(result.attempted, 5);
        assert_eq!(result.indexed, 3);
        assert_eq!(result.skipped, 2);
        assert!(result.is_consistent());
    }

    #[tokio::test]
    async fn test_decode_failure_fails_layer() {
        let store = Arc::new(MockIndexStore::new());
        let source = Arc::new(MockSource {
            decode_failure: true,
            ..MockSource::with_documents(2)
        });
        let mut pipeline = pipeline(store, source);
        pipeline.config.decode_policy = DecodePolicy::Fail;

        let result = pipeline.run(shutdown_rx()).await;

        assert_eq!(result.state, LayerState::Failed);
        assert!(result.error.as_deref().unwrap_or("").contains("decode"));
    }

    #[tokio::test]
    async fn test_create_conflict_fails_before_reading() {
        let store = Arc::new(MockIndexStore {
            create_error: Some(IndexStoreError::CreateConflict(
                "osm_test_points".to_string(),
            )),
            bulk_calls: AtomicUsize::new(0),
        });
        let source = Arc::new(MockSource::with_documents(5));

        let result = pipeline(store.clone(), source.clone())
            .run(shutdown_rx())
            .await;

        assert_eq!(result.state, LayerState::Failed);
        assert!(result
            .error
            .as_deref()
            .unwrap_or("")
            .contains("already exists"));
        assert_eq!(source.read_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_source_completes() {
        let store = Arc::new(MockIndexStore::new());
        let source = Arc::new(MockSource::with_documents(0));

        let result = pipeline(store, source).run(shutdown_rx()).await;

        assert_eq!(result.state, LayerState::Completed);
        assert_eq!(result.attempted, 0);
        assert_eq!(result.indexed, 0);
    }
}
