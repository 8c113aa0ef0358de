//! # OSM Indexer Repository
//!
//! This crate provides traits and implementations for managing layer indices
//! in the search engine. It includes definitions for errors, interfaces, and
//! a concrete implementation for OpenSearch.

pub mod errors;
pub mod interfaces;
pub mod opensearch;

pub use errors::IndexStoreError;
pub use interfaces::{BulkOutcome, IndexStore};
pub use opensearch::OpenSearchIndexStore;
