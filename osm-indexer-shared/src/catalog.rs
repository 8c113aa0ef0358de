//! Static catalog of the fixed layers and their document shapes.
//!
//! Each layer promotes a fixed set of OSM tags to first-class document
//! fields; everything else lands in the flattened `other_tags` object. The
//! catalog is read-only and defined at compile time.

use crate::layer::{Layer, UnknownLayer};

/// Tags promoted to first-class fields on point documents.
const POINT_ATTRIBUTES: &[&str] = &[
    "name",
    "man_made",
    "wikidata",
    "highway",
    "amenity",
    "crossing",
    "entrance",
    "leisure",
    "natural",
    "office",
    "place",
    "shop",
    "wheelchair",
];

/// Tags promoted to first-class fields on line documents.
const LINE_ATTRIBUTES: &[&str] = &[
    "name",
    "man_made",
    "wikidata",
    "highway",
    "access",
    "barrier",
    "lanes",
    "layer",
    "junction",
    "maxspeed",
    "oneway",
    "ref",
    "route",
    "surface",
    "waterway",
];

/// Tags promoted to first-class fields on multilinestring documents.
const MULTILINESTRING_ATTRIBUTES: &[&str] = &["name", "ref", "route", "network", "wikidata"];

/// Tags promoted to first-class fields on multipolygon documents.
const MULTIPOLYGON_ATTRIBUTES: &[&str] = &[
    "name",
    "natural",
    "man_made",
    "wikidata",
    "admin_level",
    "boundary",
    "landuse",
    "building",
];

/// Tags promoted to first-class fields on other-relation documents.
const OTHER_RELATION_ATTRIBUTES: &[&str] = &["name", "man_made", "wikidata", "type"];

/// The document shape of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerSchema {
    /// The layer this schema belongs to.
    pub layer: Layer,
    /// Tags promoted to first-class document fields for this layer.
    pub attributes: &'static [&'static str],
}

/// Read-only catalog of the fixed layers.
///
/// The catalog maps layer identifiers to their document shape. It has no
/// state and no side effects; unknown identifiers fail with [`UnknownLayer`].
pub struct LayerCatalog;

impl LayerCatalog {
    /// Look up the schema for a layer identifier.
    ///
    /// # Arguments
    ///
    /// * `id` - A layer identifier, e.g. `"points"`
    ///
    /// # Returns
    ///
    /// * `Ok(LayerSchema)` - The layer and its promoted attributes
    /// * `Err(UnknownLayer)` - If the identifier is not one of the fixed five
    pub fn lookup(id: &str) -> Result<LayerSchema, UnknownLayer> {
        id.parse::<Layer>().map(Self::schema)
    }

    /// The schema for a known layer.
    pub fn schema(layer: Layer) -> LayerSchema {
        LayerSchema {
            layer,
            attributes: Self::attributes(layer),
        }
    }

    /// The promoted attribute list for a known layer.
    pub fn attributes(layer: Layer) -> &'static [&'static str] {
        match layer {
            Layer::Points => POINT_ATTRIBUTES,
            Layer::Lines => LINE_ATTRIBUTES,
            Layer::Multilinestrings => MULTILINESTRING_ATTRIBUTES,
            Layer::Multipolygons => MULTIPOLYGON_ATTRIBUTES,
            Layer::OtherRelations => OTHER_RELATION_ATTRIBUTES,
        }
    }
}
