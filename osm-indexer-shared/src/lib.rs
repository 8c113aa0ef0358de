//! # OSM Indexer Shared
//!
//! Shared types and data structures for the OSM layer indexer system.
//!
//! This crate defines the fixed geometry layers, the layer catalog with its
//! per-layer document shapes, the feature document emitted by the conversion
//! stage, and the per-layer run results collected by the orchestrator.

pub mod catalog;
pub mod document;
pub mod layer;
pub mod result;

pub use catalog::{LayerCatalog, LayerSchema};
pub use document::FeatureDocument;
pub use layer::{Layer, UnknownLayer};
pub use result::{LayerRunResult, LayerState, RunReport};
