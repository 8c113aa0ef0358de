//! OpenSearch index store implementation.
//!
//! This module provides the concrete implementation of `IndexStore` using the
//! OpenSearch Rust client.

use std::time::Duration;

use async_trait::async_trait;
use opensearch::auth::Credentials;
use opensearch::http::request::JsonBody;
use opensearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use opensearch::indices::{
    IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesPutSettingsParts,
};
use opensearch::{BulkParts, CountParts, OpenSearch};
use serde_json::{json, Value};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::IndexStoreError;
use crate::interfaces::{BulkOutcome, IndexStore};
use crate::opensearch::index_config::NUMBER_OF_SHARDS;
use osm_indexer_shared::FeatureDocument;

/// Request timeout applied to every engine call, including bulk writes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Engine marker for a create call hitting an existing index.
const ALREADY_EXISTS_MARKER: &str = "resource_already_exists_exception";

/// OpenSearch index store implementation.
///
/// Manages layer index lifecycle and bulk document writes against an
/// OpenSearch (or wire-compatible Elasticsearch) cluster.
pub struct OpenSearchIndexStore {
    client: OpenSearch,
}

impl OpenSearchIndexStore {
    /// Create a new store connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The engine URL (e.g. "http://localhost:9200")
    /// * `username` - Basic-auth user name
    /// * `password` - Basic-auth password
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchIndexStore)` - A new store instance
    /// * `Err(IndexStoreError)` - If connection setup fails
    pub async fn new(
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, IndexStoreError> {
        let parsed_url =
            Url::parse(url).map_err(|e| IndexStoreError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .auth(Credentials::Basic(
                username.to_string(),
                password.to_string(),
            ))
            .timeout(REQUEST_TIMEOUT)
            .disable_proxy()
            .build()
            .map_err(|e| IndexStoreError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %url, user = %username, "Created search engine client");

        Ok(Self { client })
    }

    /// Count per-item failures in a bulk response body.
    ///
    /// Returns `(indexed, failed)`. The engine reports one entry per action
    /// under `items`; an entry carrying an `error` object was rejected.
    fn parse_bulk_items(body: &Value) -> (u64, u64) {
        let mut indexed = 0;
        let mut failed = 0;

        if let Some(items) = body["items"].as_array() {
            for item in items {
                let failure = item["index"]["error"].is_object();
                if failure {
                    failed += 1;
                } else {
                    indexed += 1;
                }
            }
        }

        (indexed, failed)
    }
}

#[async_trait]
impl IndexStore for OpenSearchIndexStore {
    /// Check whether an index exists via a HEAD request.
    async fn exists(&self, index: &str) -> Result<bool, IndexStoreError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| IndexStoreError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.is_success() {
            return Ok(true);
        }
        if status.as_u16() == 404 {
            return Ok(false);
        }

        let error_body = response.text().await.unwrap_or_default();
        error!(index = %index, status = %status, body = %error_body, "Existence check failed");
        Err(IndexStoreError::connection(format!(
            "Existence check for {} failed with status {}",
            index, status
        )))
    }

    /// Delete an index if present. Absence is not an error.
    async fn delete_if_exists(&self, index: &str) -> Result<bool, IndexStoreError> {
        if !self.exists(index).await? {
            debug!(index = %index, "Index absent, nothing to delete");
            return Ok(false);
        }

        info!(index = %index, "Index exists, deleting");

        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| IndexStoreError::delete(e.to_string()))?;

        let status = response.status_code();

        // 404 is acceptable - the index may have vanished since the check
        if !status.is_success() && status.as_u16() != 404 {
            let error_body = response.text().await.unwrap_or_default();
            error!(index = %index, status = %status, body = %error_body, "Delete request failed");
            return Err(IndexStoreError::delete(format!(
                "Delete of {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        Ok(status.is_success())
    }

    /// Create an index with the given mappings and replica count.
    ///
    /// Fails with `CreateConflict` if the index already exists; callers
    /// wanting a fresh index must `delete_if_exists` first.
    async fn create(
        &self,
        index: &str,
        mappings: &Value,
        replicas: u32,
    ) -> Result<(), IndexStoreError> {
        let body = json!({
            "settings": {
                "index": {
                    "number_of_shards": NUMBER_OF_SHARDS,
                    "number_of_replicas": replicas
                }
            },
            "mappings": mappings
        });

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .timeout("60s")
            .body(body)
            .send()
            .await
            .map_err(|e| IndexStoreError::create(e.to_string()))?;

        let status = response.status_code();
        if status.is_success() {
            info!(index = %index, replicas = replicas, "Created index");
            return Ok(());
        }

        let error_body = response.text().await.unwrap_or_default();
        if error_body.contains(ALREADY_EXISTS_MARKER) {
            return Err(IndexStoreError::CreateConflict(index.to_string()));
        }

        error!(index = %index, status = %status, body = %error_body, "Create request failed");
        Err(IndexStoreError::create(format!(
            "Create of {} failed with status {}: {}",
            index, status, error_body
        )))
    }

    /// Update the live replica count without touching mappings or data.
    async fn update_settings(&self, index: &str, replicas: u32) -> Result<(), IndexStoreError> {
        let response = self
            .client
            .indices()
            .put_settings(IndicesPutSettingsParts::Index(&[index]))
            .body(json!({"index": {"number_of_replicas": replicas}}))
            .send()
            .await
            .map_err(|e| IndexStoreError::settings(e.to_string()))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Err(IndexStoreError::IndexNotFound(index.to_string()));
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(index = %index, status = %status, body = %error_body, "Settings update failed");
            return Err(IndexStoreError::settings(format!(
                "Settings update of {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        info!(index = %index, replicas = replicas, "Updated index settings");
        Ok(())
    }

    /// Current document count for the index.
    async fn count(&self, index: &str) -> Result<u64, IndexStoreError> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| IndexStoreError::count(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(IndexStoreError::count(format!(
                "Count of {} failed with status {}",
                index, status
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| IndexStoreError::count(e.to_string()))?;

        body["count"].as_u64().ok_or_else(|| {
            IndexStoreError::count(format!("Count response for {} missing count field", index))
        })
    }

    /// Submit one batch as a single bulk write.
    ///
    /// Per-document rejections are reported in the outcome, not retried and
    /// not treated as call failure.
    async fn bulk_index(
        &self,
        index: &str,
        documents: &[FeatureDocument],
    ) -> Result<BulkOutcome, IndexStoreError> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
        for document in documents {
            body.push(json!({"index": {"_id": document.document_id()}}).into());
            let source = serde_json::to_value(document)
                .map_err(|e| IndexStoreError::serialization(e.to_string()))?;
            body.push(source.into());
        }

        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .body(body)
            .send()
            .await
            .map_err(|e| IndexStoreError::bulk(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(index = %index, status = %status, body = %error_body, "Bulk request failed");
            return Err(IndexStoreError::bulk(format!(
                "Bulk write to {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        let response_body = response
            .json::<Value>()
            .await
            .map_err(|e| IndexStoreError::bulk(e.to_string()))?;

        let (indexed, failed) = Self::parse_bulk_items(&response_body);
        if failed > 0 {
            info!(index = %index, failed = failed, "Documents rejected in bulk response");
        }
        debug!(index = %index, indexed = indexed, "Bulk write acknowledged");

        Ok(BulkOutcome { indexed, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bulk_items_all_ok() {
        let body = json!({
            "errors": false,
            "items": [
                {"index": {"_id": "node/1", "status": 201}},
                {"index": {"_id": "node/2", "status": 201}}
            ]
        });

        assert_eq!(OpenSearchIndexStore::parse_bulk_items(&body), (2, 0));
    }

    #[test]
    fn test_parse_bulk_items_mixed() {
        let body = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "way/1", "status": 201}},
                {"index": {"_id": "way/2", "status": 400, "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [geometry]"
                }}},
                {"index": {"_id": "way/3", "status": 201}}
            ]
        });

        assert_eq!(OpenSearchIndexStore::parse_bulk_items(&body), (2, 1));
    }

    #[test]
    fn test_parse_bulk_items_empty() {
        let body = json!({"errors": false, "items": []});
        assert_eq!(OpenSearchIndexStore::parse_bulk_items(&body), (0, 0));
    }
}
