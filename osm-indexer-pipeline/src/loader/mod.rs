//! Bulk loader for the OSM indexer pipeline.
//!
//! Consumes the converter's document stream, accumulates batches, and
//! submits them as bulk writes. Per-document rejections are recorded and
//! skipped; transport failures are retried with bounded backoff before the
//! layer is marked failed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::errors::PipelineError;
use osm_indexer_repository::{BulkOutcome, IndexStore, IndexStoreError};
use osm_indexer_shared::FeatureDocument;

/// Configuration for the bulk loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of documents to accumulate before submitting a bulk write.
    pub batch_size: usize,
    /// Total submission attempts per batch before the layer fails.
    pub max_attempts: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            max_attempts: 3,
            initial_retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
        }
    }
}

/// How a load run ended.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The source stream ended and the final batch was flushed.
    Drained,
    /// Shutdown was signalled; no further batches were started.
    Cancelled,
    /// A batch submission failed after exhausting its attempts.
    Failed(PipelineError),
}

/// Counters and outcome of one load run.
#[derive(Debug)]
pub struct LoadReport {
    /// Documents received from the converter.
    pub received: u64,
    /// Documents acknowledged by the engine.
    pub indexed: u64,
    /// Documents rejected inside bulk responses; recorded as skipped.
    pub rejected: u64,
    /// Batches submitted.
    pub batches: u64,
    /// Terminal outcome of the run.
    pub outcome: LoadOutcome,
}

/// Loader that batches documents and writes them to one target index.
pub struct BulkLoader {
    store: Arc<dyn IndexStore>,
    config: LoaderConfig,
}

impl BulkLoader {
    /// Create a new loader with the default configuration.
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self {
            store,
            config: LoaderConfig::default(),
        }
    }

    /// Create a new loader with custom configuration.
    pub fn with_config(store: Arc<dyn IndexStore>, config: LoaderConfig) -> Self {
        Self { store, config }
    }

    /// Consume the document stream and load it into `index`.
    ///
    /// Runs until the stream ends, a batch exhausts its submission attempts,
    /// or shutdown is signalled. An in-flight submission always completes or
    /// fails naturally; after shutdown no further batches are started and the
    /// partially accumulated batch is dropped.
    #[instrument(skip(self, documents, shutdown), fields(index = %index))]
    pub async fn run(
        &self,
        index: &str,
        mut documents: mpsc::Receiver<FeatureDocument>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> LoadReport {
        let mut batch: Vec<FeatureDocument> = Vec::with_capacity(self.config.batch_size);
        let mut received: u64 = 0;
        let mut indexed: u64 = 0;
        let mut rejected: u64 = 0;
        let mut batches: u64 = 0;
        let mut shutdown_open = true;

        let outcome = loop {
            tokio::select! {
                signal = shutdown.recv(), if shutdown_open => {
                    match signal {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            info!("Shutdown received, not starting further batches");
                            break LoadOutcome::Cancelled;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            shutdown_open = false;
                        }
                    }
                }
                document = documents.recv() => {
                    match document {
                        Some(document) => {
                            batch.push(document);
                            received += 1;
                            if batch.len() >= self.config.batch_size {
                                match self.submit_with_retry(index, &batch).await {
                                    Ok(outcome) => {
                                        indexed += outcome.indexed;
                                        rejected += outcome.failed;
                                        batches += 1;
                                        batch.clear();
                                    }
                                    Err(error) => break LoadOutcome::Failed(error),
                                }
                            }
                        }
                        None => {
                            // Stream ended; flush the final partial batch
                            if !batch.is_empty() {
                                match self.submit_with_retry(index, &batch).await {
                                    Ok(outcome) => {
                                        indexed += outcome.indexed;
                                        rejected += outcome.failed;
                                        batches += 1;
                                        batch.clear();
                                    }
                                    Err(error) => break LoadOutcome::Failed(error),
                                }
                            }
                            break LoadOutcome::Drained;
                        }
                    }
                }
            }
        };

        debug!(
            received = received,
            indexed = indexed,
            rejected = rejected,
            batches = batches,
            "Load run finished"
        );

        LoadReport {
            received,
            indexed,
            rejected,
            batches,
            outcome,
        }
    }

    /// Submit one batch, retrying transport failures with doubling backoff.
    ///
    /// The attempt bound counts every underlying submission, so a batch is
    /// sent at most `max_attempts` times.
    async fn submit_with_retry(
        &self,
        index: &str,
        batch: &[FeatureDocument],
    ) -> Result<BulkOutcome, PipelineError> {
        let mut delay_ms = self.config.initial_retry_delay_ms;

        for attempt in 1..=self.config.max_attempts {
            match self.store.bulk_index(index, batch).await {
                Ok(outcome) => {
                    if attempt > 1 {
                        info!(attempt = attempt, count = batch.len(), "Bulk write succeeded after retry");
                    }
                    return Ok(outcome);
                }
                Err(error) => {
                    let retryable = Self::is_retryable_error(&error);
                    if !retryable || attempt == self.config.max_attempts {
                        error!(
                            attempt = attempt,
                            retryable = retryable,
                            error = %error,
                            "Bulk write failed, giving up"
                        );
                        return Err(PipelineError::from(error));
                    }
                    warn!(
                        attempt = attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay_ms,
                        error = %error,
                        "Bulk write failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = std::cmp::min(delay_ms * 2, self.config.max_retry_delay_ms);
                }
            }
        }

        Err(PipelineError::loader("bulk submission attempts exhausted"))
    }

    /// Determine if a store error is a transient transport failure.
    fn is_retryable_error(error: &IndexStoreError) -> bool {
        match error {
            IndexStoreError::ConnectionError(_) => true,
            IndexStoreError::BulkError(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout")
                    || msg.contains("connection")
                    || msg.contains("rate limit")
                    || msg.contains("429")
                    || msg.contains("502")
                    || msg.contains("503")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock index store with scriptable bulk behavior.
    struct MockIndexStore {
        bulk_calls: AtomicUsize,
        /// Fail this many bulk calls before succeeding.
        fail_first: usize,
        /// Error returned for failed calls.
        failure: IndexStoreError,
        /// Document ids rejected inside otherwise successful responses.
        reject_ids: HashSet<String>,
    }

    impl MockIndexStore {
        fn new() -> Self {
            Self {
                bulk_calls: AtomicUsize::new(0),
                fail_first: 0,
                failure: IndexStoreError::connection("connection refused"),
                reject_ids: HashSet::new(),
            }
        }

        fn failing(fail_first: usize, failure: IndexStoreError) -> Self {
            Self {
                fail_first,
                failure,
                ..Self::new()
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
            Ok(())
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
            let call = self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(self.failure.clone());
            }
            let failed = documents
                .iter()
                .filter(|doc| self.reject_ids.contains(&doc.osm_id))
                .count() as u64;
            Ok(BulkOutcome {
                indexed: documents.len() as u64 - failed,
                failed,
            })
        }
    }

    fn documents(count: u64) -> Vec<FeatureDocument> {
        (0..count)
            .map(|id| FeatureDocument::new("node", id as i64, 1))
            .collect()
    }

    fn fast_config(batch_size: usize, max_attempts: u32) -> LoaderConfig {
        LoaderConfig {
            batch_size,
            max_attempts,
            initial_retry_delay_ms: 1,
            max_retry_delay_ms: 2,
        }
    }

    async fn run_loader(
        store: Arc<MockIndexStore>,
        config: LoaderConfig,
        docs: Vec<FeatureDocument>,
    ) -> LoadReport {
        let loader = BulkLoader::with_config(store, config);
        let (tx, rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let producer = tokio::spawn(async move {
            for doc in docs {
                if tx.send(doc).await.is_err() {
                    break;
                }
            }
        });
        let report = loader.run("test_index", rx, shutdown_rx).await;
        let _ = producer.await;
        report
    }

    #[tokio::test]
    async fn test_batches_and_final_flush() {
        let store = Arc::new(MockIndexStore::new());
        let report = run_loader(store.clone(), fast_config(3, 3), documents(7)).await;

        assert!(matches!(report.outcome, LoadOutcome::Drained));
        assert_eq!(report.received, 7);
        assert_eq!(report.indexed, 7);
        assert_eq!(report.batches, 3);
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_partial_failures_recorded_not_retried() {
        let mut store = MockIndexStore::new();
        store.reject_ids.insert("1".to_string());
        store.reject_ids.insert("3".to_string());
        let store = Arc::new(store);

        let report = run_loader(store.clone(), fast_config(10, 3), documents(5)).await;

        assert!(matches!(report.outcome, LoadOutcome::Drained));
        assert_eq!(report.indexed, 3);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.indexed + report.rejected, report.received);
        // Rejections never trigger a resubmission
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_then_succeeds() {
        let store = Arc::new(MockIndexStore::failing(
            2,
            IndexStoreError::connection("connection reset"),
        ));
        let report = run_loader(store.clone(), fast_config(10, 3), documents(4)).await;

        assert!(matches!(report.outcome, LoadOutcome::Drained));
        assert_eq!(report.indexed, 4);
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_equal_bound_then_failed() {
        let store = Arc::new(MockIndexStore::failing(
            usize::MAX,
            IndexStoreError::connection("connection reset"),
        ));
        let report = run_loader(store.clone(), fast_config(10, 3), documents(4)).await;

        assert!(matches!(report.outcome, LoadOutcome::Failed(_)));
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let store = Arc::new(MockIndexStore::failing(
            usize::MAX,
            IndexStoreError::serialization("not json"),
        ));
        let report = run_loader(store.clone(), fast_config(10, 3), documents(2)).await;

        assert!(matches!(report.outcome, LoadOutcome::Failed(_)));
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_further_batches() {
        let store = Arc::new(MockIndexStore::new());
        let loader = BulkLoader::with_config(store.clone(), fast_config(3, 3));
        let (_tx, rx) = mpsc::channel::<FeatureDocument>(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        shutdown_tx.send(()).unwrap();
        let report = loader.run("test_index", rx, shutdown_rx).await;

        assert!(matches!(report.outcome, LoadOutcome::Cancelled));
        assert_eq!(report.batches, 0);
        assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 0);
    }
}
