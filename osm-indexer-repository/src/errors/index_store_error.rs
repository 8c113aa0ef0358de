//! Index store error types.
//!
//! This module defines the error types that can occur during index lifecycle
//! and bulk-write operations against the search engine.

use thiserror::Error;

/// Errors that can occur during index store operations.
#[derive(Debug, Clone, Error)]
pub enum IndexStoreError {
    /// Failed to establish connection to the search engine.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// An index with the target name already exists.
    ///
    /// Indicates the delete-then-create protocol was violated; creation never
    /// silently overwrites.
    #[error("Index already exists: {0}")]
    CreateConflict(String),

    /// The index vanished mid-run.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Failed to create an index.
    #[error("Index creation error: {0}")]
    CreateError(String),

    /// Failed to delete an index.
    #[error("Index deletion error: {0}")]
    DeleteError(String),

    /// Failed to update live index settings.
    #[error("Settings update error: {0}")]
    SettingsError(String),

    /// Failed to read the document count.
    #[error("Count error: {0}")]
    CountError(String),

    /// A bulk write request failed at the transport level.
    #[error("Bulk request error: {0}")]
    BulkError(String),

    /// Failed to serialize a document for the engine.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl IndexStoreError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an index creation error.
    pub fn create(msg: impl Into<String>) -> Self {
        Self::CreateError(msg.into())
    }

    /// Create an index deletion error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteError(msg.into())
    }

    /// Create a settings update error.
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::SettingsError(msg.into())
    }

    /// Create a count error.
    pub fn count(msg: impl Into<String>) -> Self {
        Self::CountError(msg.into())
    }

    /// Create a bulk request error.
    pub fn bulk(msg: impl Into<String>) -> Self {
        Self::BulkError(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }
}
