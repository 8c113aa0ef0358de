//! The fixed geometry layers of an OSM extract.
//!
//! Source features are partitioned into five layers, each loaded into its own
//! index. The set is fixed at compile time; layer identifiers arriving from
//! configuration are validated against it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A layer identifier that is not one of the five fixed layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown layer: {0}")]
pub struct UnknownLayer(pub String);

/// One of the fixed geometry layers an OSM extract is partitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Tagged nodes.
    Points,
    /// Open ways.
    Lines,
    /// Route-like relations assembled from member ways.
    Multilinestrings,
    /// Closed ways and multipolygon relations.
    Multipolygons,
    /// Remaining tagged relations.
    OtherRelations,
}

impl Layer {
    /// All layers, in load order.
    pub const ALL: [Layer; 5] = [
        Layer::Points,
        Layer::Lines,
        Layer::Multilinestrings,
        Layer::Multipolygons,
        Layer::OtherRelations,
    ];

    /// The layer identifier as it appears in index names and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Points => "points",
            Layer::Lines => "lines",
            Layer::Multilinestrings => "multilinestrings",
            Layer::Multipolygons => "multipolygons",
            Layer::OtherRelations => "other_relations",
        }
    }

    /// Derive the target index name for this layer.
    ///
    /// Uses the persisted naming convention `{prefix}_{task}_{layer}`.
    pub fn index_name(&self, prefix: &str, task: &str) -> String {
        format!("{}_{}_{}", prefix, task, self.as_str())
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = UnknownLayer;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "points" => Ok(Layer::Points),
            "lines" => Ok(Layer::Lines),
            "multilinestrings" => Ok(Layer::Multilinestrings),
            "multipolygons" => Ok(Layer::Multipolygons),
            "other_relations" => Ok(Layer::OtherRelations),
            other => Err(UnknownLayer(other.to_string())),
        }
    }
}
