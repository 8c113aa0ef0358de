//! Index store trait definition.
//!
//! This module defines the abstract interface for index lifecycle and bulk
//! write operations, allowing for different backend implementations
//! (OpenSearch, Elasticsearch, mocks for testing).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::IndexStoreError;
use osm_indexer_shared::FeatureDocument;

/// Outcome of one bulk write.
///
/// Transport-level failure is an error; per-document failures inside an
/// otherwise successful bulk response are data in the outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Documents acknowledged by the engine.
    pub indexed: u64,
    /// Documents rejected by the engine within the bulk response.
    pub failed: u64,
}

/// Abstract interface for index lifecycle and bulk write operations.
///
/// Deleting and creating an index are deliberately separate operations: a
/// caller wanting a fresh index runs `delete_if_exists` followed by `create`,
/// and `create` fails on a pre-existing index instead of overwriting it. This
/// keeps each phase of the recreate protocol independently verifiable.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Check whether an index exists.
    async fn exists(&self, index: &str) -> Result<bool, IndexStoreError>;

    /// Delete an index if it exists.
    ///
    /// Idempotent: absence is not an error. Destructive: prior documents are
    /// irreversibly removed.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The index existed and was deleted
    /// * `Ok(false)` - No index with that name existed
    /// * `Err(IndexStoreError)` - If the existence check or delete fails
    async fn delete_if_exists(&self, index: &str) -> Result<bool, IndexStoreError>;

    /// Create an index with the given mappings and replica count.
    ///
    /// # Arguments
    ///
    /// * `index` - The target index name
    /// * `mappings` - The mapping schema for the index
    /// * `replicas` - Replica count to load with (typically 0, raised later)
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was created
    /// * `Err(IndexStoreError::CreateConflict)` - If an index with that name
    ///   already exists; callers must `delete_if_exists` first
    async fn create(
        &self,
        index: &str,
        mappings: &Value,
        replicas: u32,
    ) -> Result<(), IndexStoreError>;

    /// Update live settings (replica count) without touching mappings or data.
    ///
    /// Used post-load to raise replicas back up after loading with a low
    /// replica count for write throughput.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the settings were applied
    /// * `Err(IndexStoreError::IndexNotFound)` - If the index vanished mid-run
    async fn update_settings(&self, index: &str, replicas: u32) -> Result<(), IndexStoreError>;

    /// Current document count for verification and reporting.
    ///
    /// Callers treat transient failures as non-fatal: log and proceed.
    async fn count(&self, index: &str) -> Result<u64, IndexStoreError>;

    /// Submit one batch of documents as a single bulk write.
    ///
    /// Per-document failures are tolerated and reported in the outcome; they
    /// do not fail the call.
    async fn bulk_index(
        &self,
        index: &str,
        documents: &[FeatureDocument],
    ) -> Result<BulkOutcome, IndexStoreError>;
}
