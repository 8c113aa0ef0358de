//! Error types for the OSM indexer pipeline.

use thiserror::Error;

use crate::converter::SourceError;
use osm_indexer_repository::IndexStoreError;

/// Errors that can occur in the ingestion pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error from the source converter.
    #[error("Source error: {0}")]
    SourceError(#[from] SourceError),

    /// Error from the bulk loader.
    #[error("Loader error: {0}")]
    LoaderError(String),

    /// Error from the index store.
    #[error("Index store error: {0}")]
    IndexStoreError(#[from] IndexStoreError),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// A spawned task failed.
    #[error("Task error: {0}")]
    TaskError(String),

    /// The run was cancelled before the layer completed.
    #[error("Run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Create a loader error.
    pub fn loader(msg: impl Into<String>) -> Self {
        Self::LoaderError(msg.into())
    }

    /// Create a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::ChannelError(msg.into())
    }

    /// Create a task error.
    pub fn task(msg: impl Into<String>) -> Self {
        Self::TaskError(msg.into())
    }
}
