//! # OSM Indexer
//!
//! Main library for the OSM layer indexer.
//!
//! This crate provides the entry point and configuration for running the
//! layered ingestion pipeline against a search engine.

pub mod config;

pub use config::{Cli, Dependencies, RunConfig};

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// The input file does not exist. Raised before any engine call.
    #[error("Input file missing: {0:?}")]
    InputMissing(PathBuf),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] osm_indexer_pipeline::PipelineError),

    /// Index store error.
    #[error("Index store error: {0}")]
    IndexStoreError(#[from] osm_indexer_repository::IndexStoreError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
