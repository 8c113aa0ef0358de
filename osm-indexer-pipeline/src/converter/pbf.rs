//! PBF-backed feature source.
//!
//! Thin adapter over the `osmpbf` parser. Each layer is produced by a fresh
//! scan of the file; geometry-bearing layers first build a whole-file node
//! location index (the moral equivalent of osmium's flex_mem cache) and then
//! assemble geometries from it.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::DateTime;
use osmpbf::{DenseNodeInfo, Element, ElementReader, Info, RelMemberType};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::converter::{
    partition_tags, ConvertSummary, DecodePolicy, FeatureSource, SourceError,
};
use osm_indexer_shared::{FeatureDocument, Layer};

/// Log conversion progress every this many produced documents.
const PROGRESS_INTERVAL: u64 = 50_000;

/// Feature source reading an OSM PBF extract from disk.
pub struct PbfSource {
    path: PathBuf,
}

impl PbfSource {
    /// Create a source for the given PBF file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Run one full scan of the file, feeding every element to `f`.
    fn scan<F>(&self, f: F) -> Result<(), SourceError>
    where
        F: FnMut(Element<'_>),
    {
        let reader = ElementReader::from_path(&self.path).map_err(|e| SourceError::Open {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let mut f = f;
        reader
            .for_each(|element| f(element))
            .map_err(|e| SourceError::Read(e.to_string()))
    }

    /// Build the whole-file node location index used to assemble way and
    /// relation geometries.
    fn load_node_locations(&self) -> Result<HashMap<i64, [f64; 2]>, SourceError> {
        let mut locations = HashMap::new();
        self.scan(|element| match element {
            Element::Node(node) => {
                locations.insert(node.id(), [node.lon(), node.lat()]);
            }
            Element::DenseNode(node) => {
                locations.insert(node.id(), [node.lon(), node.lat()]);
            }
            Element::Way(_) | Element::Relation(_) => {}
        })?;
        debug!(nodes = locations.len(), "Node location index built");
        Ok(locations)
    }

    fn read_points(&self, mut emitter: Emitter) -> Result<ConvertSummary, SourceError> {
        self.scan(|element| {
            if !emitter.active() {
                return;
            }
            match element {
                Element::Node(node) => {
                    let tags = collect_tags(node.tags());
                    if tags.is_empty() {
                        return;
                    }
                    let (version, timestamp) = info_meta(node.info());
                    emit_point(
                        &mut emitter,
                        node.id(),
                        node.lon(),
                        node.lat(),
                        version,
                        timestamp,
                        tags,
                    );
                }
                Element::DenseNode(node) => {
                    let tags = collect_tags(node.tags());
                    if tags.is_empty() {
                        return;
                    }
                    let (version, timestamp) = dense_meta(node.info().cloned());
                    emit_point(
                        &mut emitter,
                        node.id(),
                        node.lon(),
                        node.lat(),
                        version,
                        timestamp,
                        tags,
                    );
                }
                Element::Way(_) | Element::Relation(_) => {}
            }
        })?;
        emitter.finish()
    }

    fn read_lines(&self, mut emitter: Emitter) -> Result<ConvertSummary, SourceError> {
        let locations = self.load_node_locations()?;
        self.scan(|element| {
            if !emitter.active() {
                return;
            }
            if let Element::Way(way) = element {
                let tags = collect_tags(way.tags());
                if tags.is_empty() {
                    return;
                }
                let refs: Vec<i64> = way.refs().collect();
                // Closed rings belong to the multipolygons layer
                if is_closed(&refs) {
                    return;
                }
                let (version, timestamp) = info_meta(way.info());
                match line_coordinates(&refs, &locations) {
                    Some(coordinates) => {
                        let geometry = json!({
                            "type": "LineString",
                            "coordinates": coordinates
                        });
                        emitter.emit(build_document(
                            Layer::Lines,
                            "way",
                            way.id(),
                            version,
                            timestamp,
                            Some(geometry),
                            tags,
                        ));
                    }
                    None => emitter.reject(way.id(), "unresolvable node reference"),
                }
            }
        })?;
        emitter.finish()
    }

    fn read_multipolygons(&self, mut emitter: Emitter) -> Result<ConvertSummary, SourceError> {
        let locations = self.load_node_locations()?;
        // Way node refs are cached as the scan passes over them so that
        // multipolygon relations, which come later in the file, can assemble
        // rings from their member ways.
        let mut way_refs: HashMap<i64, Vec<i64>> = HashMap::new();

        self.scan(|element| {
            if !emitter.active() {
                return;
            }
            match element {
                Element::Way(way) => {
                    let refs: Vec<i64> = way.refs().collect();
                    let tags = collect_tags(way.tags());
                    if is_closed(&refs) && !tags.is_empty() {
                        let (version, timestamp) = info_meta(way.info());
                        match line_coordinates(&refs, &locations) {
                            Some(ring) => {
                                let geometry = json!({
                                    "type": "Polygon",
                                    "coordinates": [ring]
                                });
                                emitter.emit(build_document(
                                    Layer::Multipolygons,
                                    "way",
                                    way.id(),
                                    version,
                                    timestamp,
                                    Some(geometry),
                                    tags,
                                ));
                            }
                            None => emitter.reject(way.id(), "unresolvable node reference"),
                        }
                    }
                    way_refs.insert(way.id(), refs);
                }
                Element::Relation(relation) => {
                    let tags = collect_tags(relation.tags());
                    if tags.get("type").map(String::as_str) != Some("multipolygon") {
                        return;
                    }
                    let mut rings: Vec<Vec<[f64; 2]>> = Vec::new();
                    for member in relation.members() {
                        if !matches!(member.member_type, RelMemberType::Way) {
                            continue;
                        }
                        // Inner rings are not subtracted; outer members only
                        if matches!(member.role(), Ok("inner")) {
                            continue;
                        }
                        if let Some(refs) = way_refs.get(&member.member_id) {
                            if is_closed(refs) {
                                if let Some(ring) = line_coordinates(refs, &locations) {
                                    rings.push(ring);
                                }
                            }
                        }
                    }
                    if rings.is_empty() {
                        emitter.reject(relation.id(), "no closed member rings");
                        return;
                    }
                    let polygons: Vec<Value> = rings.into_iter().map(|ring| json!([ring])).collect();
                    let geometry = json!({
                        "type": "MultiPolygon",
                        "coordinates": polygons
                    });
                    let (version, timestamp) = info_meta(relation.info());
                    emitter.emit(build_document(
                        Layer::Multipolygons,
                        "relation",
                        relation.id(),
                        version,
                        timestamp,
                        Some(geometry),
                        tags,
                    ));
                }
                Element::Node(_) | Element::DenseNode(_) => {}
            }
        })?;
        emitter.finish()
    }

    fn read_multilinestrings(&self, mut emitter: Emitter) -> Result<ConvertSummary, SourceError> {
        let locations = self.load_node_locations()?;
        let mut way_refs: HashMap<i64, Vec<i64>> = HashMap::new();

        self.scan(|element| {
            if !emitter.active() {
                return;
            }
            match element {
                Element::Way(way) => {
                    way_refs.insert(way.id(), way.refs().collect());
                }
                Element::Relation(relation) => {
                    let tags = collect_tags(relation.tags());
                    if !is_route_like(&tags) {
                        return;
                    }
                    let mut lines: Vec<Vec<[f64; 2]>> = Vec::new();
                    for member in relation.members() {
                        if !matches!(member.member_type, RelMemberType::Way) {
                            continue;
                        }
                        if let Some(refs) = way_refs.get(&member.member_id) {
                            if let Some(line) = line_coordinates(refs, &locations) {
                                lines.push(line);
                            }
                        }
                    }
                    if lines.is_empty() {
                        emitter.reject(relation.id(), "no resolvable member ways");
                        return;
                    }
                    let geometry = json!({
                        "type": "MultiLineString",
                        "coordinates": lines
                    });
                    let (version, timestamp) = info_meta(relation.info());
                    emitter.emit(build_document(
                        Layer::Multilinestrings,
                        "relation",
                        relation.id(),
                        version,
                        timestamp,
                        Some(geometry),
                        tags,
                    ));
                }
                Element::Node(_) | Element::DenseNode(_) => {}
            }
        })?;
        emitter.finish()
    }

    fn read_other_relations(&self, mut emitter: Emitter) -> Result<ConvertSummary, SourceError> {
        self.scan(|element| {
            if !emitter.active() {
                return;
            }
            if let Element::Relation(relation) = element {
                let tags = collect_tags(relation.tags());
                if tags.is_empty() {
                    return;
                }
                // Multipolygon and route relations are covered by their own layers
                if matches!(
                    tags.get("type").map(String::as_str),
                    Some("multipolygon") | Some("route") | Some("multilinestring")
                ) {
                    return;
                }
                let members: Vec<Value> = relation
                    .members()
                    .map(|member| {
                        json!({
                            "ref": member.member_id,
                            "role": member.role().unwrap_or_default(),
                            "type": member_type_str(member.member_type)
                        })
                    })
                    .collect();
                let (version, timestamp) = info_meta(relation.info());
                let mut document = build_document(
                    Layer::OtherRelations,
                    "relation",
                    relation.id(),
                    version,
                    timestamp,
                    None,
                    tags,
                );
                document.members = Some(Value::Array(members));
                emitter.emit(document);
            }
        })?;
        emitter.finish()
    }
}

impl FeatureSource for PbfSource {
    fn read_layer(
        &self,
        layer: Layer,
        policy: DecodePolicy,
        sink: mpsc::Sender<FeatureDocument>,
    ) -> Result<ConvertSummary, SourceError> {
        info!(layer = %layer, path = %self.path.display(), "Converting layer");
        let emitter = Emitter::new(layer, policy, sink);
        let summary = match layer {
            Layer::Points => self.read_points(emitter),
            Layer::Lines => self.read_lines(emitter),
            Layer::Multipolygons => self.read_multipolygons(emitter),
            Layer::Multilinestrings => self.read_multilinestrings(emitter),
            Layer::OtherRelations => self.read_other_relations(emitter),
        }?;
        info!(
            layer = %layer,
            produced = summary.produced,
            skipped = summary.skipped,
            "Layer conversion finished"
        );
        Ok(summary)
    }
}

/// Pushes documents into the pipeline channel, applying the decode policy
/// and tracking the layer summary.
struct Emitter {
    layer: Layer,
    policy: DecodePolicy,
    sink: mpsc::Sender<FeatureDocument>,
    summary: ConvertSummary,
    failure: Option<SourceError>,
    receiver_closed: bool,
}

impl Emitter {
    fn new(layer: Layer, policy: DecodePolicy, sink: mpsc::Sender<FeatureDocument>) -> Self {
        Self {
            layer,
            policy,
            sink,
            summary: ConvertSummary::default(),
            failure: None,
            receiver_closed: false,
        }
    }

    /// Whether the scan should keep producing.
    fn active(&self) -> bool {
        self.failure.is_none() && !self.receiver_closed
    }

    fn emit(&mut self, document: FeatureDocument) {
        if self.sink.blocking_send(document).is_err() {
            // Consumer is gone; its outcome decides the layer result
            self.receiver_closed = true;
            return;
        }
        self.summary.produced += 1;
        if self.summary.produced % PROGRESS_INTERVAL == 0 {
            info!(
                layer = %self.layer,
                produced = self.summary.produced,
                "Conversion progress"
            );
        }
    }

    fn reject(&mut self, element_id: i64, message: &str) {
        match self.policy {
            DecodePolicy::Skip => {
                self.summary.skipped += 1;
                debug!(
                    layer = %self.layer,
                    element_id = element_id,
                    message = message,
                    "Skipped malformed feature"
                );
            }
            DecodePolicy::Fail => {
                self.failure = Some(SourceError::FeatureDecode {
                    layer: self.layer,
                    element_id,
                    message: message.to_string(),
                });
            }
        }
    }

    fn finish(self) -> Result<ConvertSummary, SourceError> {
        match self.failure {
            Some(error) => Err(error),
            None => Ok(self.summary),
        }
    }
}

fn emit_point(
    emitter: &mut Emitter,
    id: i64,
    lon: f64,
    lat: f64,
    version: i32,
    timestamp: Option<String>,
    tags: BTreeMap<String, String>,
) {
    if !valid_coordinate(lon, lat) {
        emitter.reject(id, "coordinate out of range");
        return;
    }
    let geometry = json!({
        "type": "Point",
        "coordinates": [lon, lat]
    });
    emitter.emit(build_document(
        Layer::Points,
        "node",
        id,
        version,
        timestamp,
        Some(geometry),
        tags,
    ));
}

fn build_document(
    layer: Layer,
    osm_type: &str,
    id: i64,
    version: i32,
    timestamp: Option<String>,
    geometry: Option<Value>,
    tags: BTreeMap<String, String>,
) -> FeatureDocument {
    let num_tags = tags.len() as u32;
    let (attributes, other_tags) = partition_tags(layer, tags);
    let mut document = FeatureDocument::new(osm_type, id, version);
    document.osm_timestamp = timestamp;
    document.geometry = geometry;
    document.num_tags = num_tags;
    document.other_tags = other_tags;
    document.attributes = attributes;
    document
}

fn collect_tags<'a, T>(tags: T) -> BTreeMap<String, String>
where
    T: IntoIterator<Item = (&'a str, &'a str)>,
{
    tags.into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

fn valid_coordinate(lon: f64, lat: f64) -> bool {
    lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat)
}

/// A way forms a ring when it has at least four references and returns to
/// its first node.
fn is_closed(refs: &[i64]) -> bool {
    refs.len() >= 4 && refs.first() == refs.last()
}

/// Resolve way node references against the location index.
///
/// Returns `None` when the way is degenerate or any reference is missing
/// from the index.
fn line_coordinates(refs: &[i64], locations: &HashMap<i64, [f64; 2]>) -> Option<Vec<[f64; 2]>> {
    if refs.len() < 2 {
        return None;
    }
    refs.iter().map(|id| locations.get(id).copied()).collect()
}

fn is_route_like(tags: &BTreeMap<String, String>) -> bool {
    matches!(
        tags.get("type").map(String::as_str),
        Some("route") | Some("multilinestring")
    )
}

fn member_type_str(member_type: RelMemberType) -> &'static str {
    match member_type {
        RelMemberType::Node => "node",
        RelMemberType::Way => "way",
        RelMemberType::Relation => "relation",
    }
}

fn info_meta(info: Info) -> (i32, Option<String>) {
    let version = info.version().unwrap_or(0);
    let timestamp = info
        .milli_timestamp()
        .and_then(DateTime::from_timestamp_millis)
        .map(FeatureDocument::format_timestamp);
    (version, timestamp)
}

fn dense_meta(info: Option<DenseNodeInfo>) -> (i32, Option<String>) {
    match info {
        Some(info) => {
            let timestamp = DateTime::from_timestamp_millis(info.milli_timestamp())
                .map(FeatureDocument::format_timestamp);
            (info.version(), timestamp)
        }
        None => (0, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locations(entries: &[(i64, [f64; 2])]) -> HashMap<i64, [f64; 2]> {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_is_closed() {
        assert!(is_closed(&[1, 2, 3, 1]));
        assert!(!is_closed(&[1, 2, 3, 4]));
        assert!(!is_closed(&[1, 2, 1]));
        assert!(!is_closed(&[]));
    }

    #[test]
    fn test_line_coordinates_resolution() {
        let index = locations(&[(1, [1.5, 42.5]), (2, [1.6, 42.6])]);
        assert_eq!(
            line_coordinates(&[1, 2], &index),
            Some(vec![[1.5, 42.5], [1.6, 42.6]])
        );
        // Missing reference
        assert_eq!(line_coordinates(&[1, 3], &index), None);
        // Degenerate way
        assert_eq!(line_coordinates(&[1], &index), None);
    }

    #[test]
    fn test_valid_coordinate() {
        assert!(valid_coordinate(1.52, 42.51));
        assert!(!valid_coordinate(181.0, 0.0));
        assert!(!valid_coordinate(0.0, -91.0));
        assert!(!valid_coordinate(f64::NAN, 0.0));
    }

    #[test]
    fn test_build_document_partitions_tags() {
        let mut tags = BTreeMap::new();
        tags.insert("highway".to_string(), "residential".to_string());
        tags.insert("surface_colour".to_string(), "red".to_string());

        let document = build_document(Layer::Lines, "way", 7, 2, None, None, tags);

        assert_eq!(document.osm_id, "7");
        assert_eq!(document.osm_type, "way");
        assert_eq!(document.osm_version, 2);
        assert_eq!(document.num_tags, 2);
        assert_eq!(
            document.attributes.get("highway").map(String::as_str),
            Some("residential")
        );
        assert!(document.other_tags.contains_key("surface_colour"));
    }

    #[test]
    fn test_route_detection() {
        let mut tags = BTreeMap::new();
        tags.insert("type".to_string(), "route".to_string());
        assert!(is_route_like(&tags));

        tags.insert("type".to_string(), "boundary".to_string());
        assert!(!is_route_like(&tags));
    }
}
