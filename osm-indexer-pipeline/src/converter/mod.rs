//! Feature stream converter.
//!
//! This module defines the seam between the pipeline and the external
//! dataset parser: a [`FeatureSource`] produces per-layer document streams
//! into a bounded channel, and the decode-failure policy decides whether a
//! malformed feature skips or fails the layer.

mod pbf;

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc;

use osm_indexer_shared::{FeatureDocument, Layer, LayerCatalog};

pub use pbf::PbfSource;

/// Errors that can occur while reading the source dataset.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to open the source dataset.
    #[error("Failed to open source dataset {path:?}: {message}")]
    Open { path: PathBuf, message: String },

    /// Failed while scanning the source dataset.
    #[error("Failed to read source dataset: {0}")]
    Read(String),

    /// A single feature could not be decoded.
    ///
    /// Under [`DecodePolicy::Skip`] the feature is counted and dropped; under
    /// [`DecodePolicy::Fail`] this error fails the whole layer.
    #[error("Failed to decode {layer} feature {element_id}: {message}")]
    FeatureDecode {
        layer: Layer,
        element_id: i64,
        message: String,
    },
}

/// What to do with a feature that fails to decode.
///
/// The source behavior mixed tolerant and fail-fast paths; here the boundary
/// is an explicit configuration choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Record the feature as skipped and continue. The default.
    #[default]
    Skip,
    /// Fail the whole layer on the first malformed feature.
    Fail,
}

/// Counters reported by the converter when a layer stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    /// Documents emitted into the channel.
    pub produced: u64,
    /// Malformed features dropped under [`DecodePolicy::Skip`].
    pub skipped: u64,
}

impl ConvertSummary {
    /// Features the converter attempted: emitted plus skipped.
    pub fn attempted(&self) -> u64 {
        self.produced + self.skipped
    }
}

/// Abstract source of per-layer feature documents.
///
/// Implementations stream documents for one layer, in source order, into the
/// given channel. The stream is finite and restartable only by re-invoking
/// from scratch; there is no resumable cursor. Reading is blocking work and
/// runs on a blocking task; producers block when the channel is full.
///
/// When the receiving side of the channel closes, implementations stop
/// emitting and return the summary accumulated so far; the consumer's
/// outcome decides the layer result.
pub trait FeatureSource: Send + Sync {
    /// Stream all documents of one layer into `sink`.
    fn read_layer(
        &self,
        layer: Layer,
        policy: DecodePolicy,
        sink: mpsc::Sender<FeatureDocument>,
    ) -> Result<ConvertSummary, SourceError>;
}

/// Split a feature's tags into promoted attributes and the `other_tags` bag.
///
/// Promotion follows the layer catalog: tags in the layer's attribute list
/// become first-class fields, everything else lands in `other_tags`.
pub fn partition_tags(
    layer: Layer,
    tags: BTreeMap<String, String>,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let promoted_keys = LayerCatalog::attributes(layer);
    let mut promoted = BTreeMap::new();
    let mut other = BTreeMap::new();

    for (key, value) in tags {
        if promoted_keys.contains(&key.as_str()) {
            promoted.insert(key, value);
        } else {
            other.insert(key, value);
        }
    }

    (promoted, other)
}
