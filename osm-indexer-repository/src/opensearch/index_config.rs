//! Index settings and mappings for the layer indices.
//!
//! Every layer index shares the common feature fields (geometry, source id,
//! version, timestamp, tag bag); the layer's promoted attributes from the
//! catalog are added on top.

use serde_json::{json, Map, Value};

use osm_indexer_shared::{Layer, LayerCatalog};

/// Primary shard count for every layer index.
pub const NUMBER_OF_SHARDS: u32 = 1;

/// Date format the engine uses for `osm_timestamp`.
pub const OSM_TIMESTAMP_FORMAT: &str = "yyyy/MM/ddHH:mm:ss.SSS";

/// Get the mapping schema for one layer index.
///
/// Common properties:
/// - **geometry**: geo_shape, the feature geometry
/// - **osm_id** / **osm_type** / **osm_version** / **osm_timestamp**: source
///   identity and version metadata
/// - **other_tags**: flattened bag of non-promoted tags
///
/// Promoted attributes are indexed as `keyword`, except `name`, which is
/// full-text.
pub fn layer_mappings(layer: Layer) -> Value {
    let mut properties = Map::new();
    properties.insert("geometry".to_string(), json!({"type": "geo_shape"}));
    properties.insert("osm_id".to_string(), json!({"type": "text"}));
    properties.insert("osm_type".to_string(), json!({"type": "keyword"}));
    properties.insert("osm_version".to_string(), json!({"type": "integer"}));
    properties.insert(
        "osm_timestamp".to_string(),
        json!({"type": "date", "format": OSM_TIMESTAMP_FORMAT}),
    );
    properties.insert("num_tags".to_string(), json!({"type": "integer"}));
    properties.insert("other_tags".to_string(), json!({"type": "flattened"}));

    if layer == Layer::OtherRelations {
        properties.insert(
            "members".to_string(),
            json!({
                "properties": {
                    "ref": {"type": "keyword"},
                    "role": {"type": "keyword"},
                    "type": {"type": "keyword"}
                }
            }),
        );
    }

    for attribute in LayerCatalog::attributes(layer) {
        let field_type = if *attribute == "name" { "text" } else { "keyword" };
        properties.insert(attribute.to_string(), json!({"type": field_type}));
    }

    json!({"properties": Value::Object(properties)})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_properties_present() {
        for layer in Layer::ALL {
            let mappings = layer_mappings(layer);

            assert_eq!(mappings["properties"]["geometry"]["type"], "geo_shape");
            assert_eq!(mappings["properties"]["osm_id"]["type"], "text");
            assert_eq!(mappings["properties"]["osm_version"]["type"], "integer");
            assert_eq!(mappings["properties"]["osm_timestamp"]["type"], "date");
            assert_eq!(
                mappings["properties"]["osm_timestamp"]["format"],
                OSM_TIMESTAMP_FORMAT
            );
            assert_eq!(mappings["properties"]["other_tags"]["type"], "flattened");
        }
    }

    #[test]
    fn test_promoted_attributes_mapped() {
        let mappings = layer_mappings(Layer::Points);
        assert_eq!(mappings["properties"]["name"]["type"], "text");
        assert_eq!(mappings["properties"]["amenity"]["type"], "keyword");

        let mappings = layer_mappings(Layer::Multipolygons);
        assert_eq!(mappings["properties"]["building"]["type"], "keyword");
    }

    #[test]
    fn test_members_only_on_other_relations() {
        let mappings = layer_mappings(Layer::OtherRelations);
        assert_eq!(
            mappings["properties"]["members"]["properties"]["role"]["type"],
            "keyword"
        );

        let mappings = layer_mappings(Layer::Points);
        assert!(mappings["properties"].get("members").is_none());
    }

}
