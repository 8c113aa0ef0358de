//! The feature document emitted by the conversion stage.
//!
//! A document is one geographic feature: geometry, source identity and
//! version metadata, the layer's promoted attributes, and the remaining tags
//! as a flattened map. Documents are immutable once emitted; ownership passes
//! to the bulk loader.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timestamp render format expected by the index mapping.
///
/// Mirrors the mapping's date format `yyyy/MM/ddHH:mm:ss.SSS`.
const TIMESTAMP_FORMAT: &str = "%Y/%m/%d%H:%M:%S%.3f";

/// One geographic feature, ready for bulk indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDocument {
    /// Source feature id, as assigned by the dataset.
    pub osm_id: String,
    /// Source element kind: `node`, `way` or `relation`.
    pub osm_type: String,
    /// Source feature version.
    pub osm_version: i32,
    /// Source timestamp, rendered in the mapping's date format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub osm_timestamp: Option<String>,
    /// GeoJSON geometry object. Absent for geometry-less relations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    /// Relation members (`ref`/`role`/`type`), only on other-relation
    /// documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Value>,
    /// Number of tags on the source feature.
    pub num_tags: u32,
    /// Tags not promoted to first-class fields.
    pub other_tags: BTreeMap<String, String>,
    /// Promoted layer attributes, serialized as top-level fields.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

impl FeatureDocument {
    /// Create a document with identity fields only.
    pub fn new(osm_type: impl Into<String>, osm_id: i64, osm_version: i32) -> Self {
        Self {
            osm_id: osm_id.to_string(),
            osm_type: osm_type.into(),
            osm_version,
            osm_timestamp: None,
            geometry: None,
            members: None,
            num_tags: 0,
            other_tags: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// The stable per-index document id: `{osm_type}/{osm_id}`.
    ///
    /// Way and relation ids share a number space, so the kind is part of the
    /// id to keep documents distinct within one index.
    pub fn document_id(&self) -> String {
        format!("{}/{}", self.osm_type, self.osm_id)
    }

    /// Render a source timestamp in the mapping's date format.
    pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
        timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id() {
        let doc = FeatureDocument::new("way", 4217, 3);
        assert_eq!(doc.document_id(), "way/4217");
    }

    #[test]
    fn test_format_timestamp() {
        let ts = DateTime::from_timestamp_millis(1_673_778_600_123).unwrap();
        assert_eq!(
            FeatureDocument::format_timestamp(ts),
            "2023/01/1510:30:00.123"
        );
    }

    #[test]
    fn test_attributes_serialize_flat() {
        let mut doc = FeatureDocument::new("node", 99, 1);
        doc.attributes
            .insert("name".to_string(), "Plaça del Poble".to_string());
        doc.other_tags
            .insert("opening_hours".to_string(), "24/7".to_string());
        doc.geometry = Some(json!({"type": "Point", "coordinates": [1.52, 42.51]}));

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["name"], "Plaça del Poble");
        assert_eq!(value["other_tags"]["opening_hours"], "24/7");
        assert_eq!(value["geometry"]["type"], "Point");
        assert_eq!(value["osm_id"], "99");
        assert!(value.get("osm_timestamp").is_none());
    }
}
