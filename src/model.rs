//! # Data Model
//!
//! Core records for the link/node network: typed identifiers, exact planar
//! coordinates, link and node rows, and the zone layers derived from them.

use geo::{Coord, LineString, Point};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Storage-assigned row handle. Assigned on insert and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed identifier value stored in an id field.
///
/// Variant order defines the cross-type ordering; a single field only ever
/// holds one kind, so that ordering never decides anything in practice.
///
/// In JSON, integers and text are bare values and UUIDs are written as
/// `{"uuid": "..."}`, so text that looks like a UUID stays text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Int(i64),
    Uuid(#[serde(with = "tagged_uuid")] Uuid),
    Text(String),
}

mod tagged_uuid {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use uuid::Uuid;

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Tagged {
        uuid: Uuid,
    }

    pub fn serialize<S: Serializer>(value: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        Tagged { uuid: *value }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        Tagged::deserialize(deserializer).map(|tagged| tagged.uuid)
    }
}

impl Identifier {
    /// `0` and the empty string are "no value" sentinels in persisted fields.
    pub fn is_missing(&self) -> bool {
        match self {
            Identifier::Int(value) => *value == 0,
            Identifier::Text(value) => value.is_empty(),
            Identifier::Uuid(value) => value.is_nil(),
        }
    }

    /// Collapse sentinel values to `None`.
    pub fn normalize(value: Option<&Identifier>) -> Option<Identifier> {
        value.filter(|id| !id.is_missing()).cloned()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Int(value) => write!(f, "{}", value),
            Identifier::Uuid(value) => write!(f, "{{{}}}", value),
            Identifier::Text(value) => write!(f, "{}", value),
        }
    }
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Identifier::Int(value)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier::Text(value.to_string())
    }
}

/// Render an optional value the way audit lines expect it.
pub fn display_optional<T: fmt::Display>(value: Option<&T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "None".to_string(),
    }
}

/// An exact planar point used as a natural key.
///
/// Two coordinates are the same node iff they compare equal bit-for-bit
/// (modulo `-0.0 == 0.0`). Ordering is lexicographic on `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: OrderedFloat<f64>,
    pub y: OrderedFloat<f64>,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: OrderedFloat(x),
            y: OrderedFloat(y),
        }
    }

    pub fn to_point(self) -> Point<f64> {
        Point::new(self.x.0, self.y.0)
    }

    pub fn to_coord(self) -> Coord<f64> {
        Coord {
            x: self.x.0,
            y: self.y.0,
        }
    }
}

impl From<Coord<f64>> for Coordinate {
    fn from(coord: Coord<f64>) -> Self {
        Self::new(coord.x, coord.y)
    }
}

impl From<Point<f64>> for Coordinate {
    fn from(point: Point<f64>) -> Self {
        Self::new(point.x(), point.y())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x.0, self.y.0)
    }
}

/// Plain attribute value carried on a link row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "None"),
            FieldValue::Int(value) => write!(f, "{}", value),
            FieldValue::Real(value) => write!(f, "{}", value),
            FieldValue::Text(value) => write!(f, "{}", value),
        }
    }
}

/// A directed line feature. `from_node`/`to_node` name the nodes at the
/// first and last vertex of `geometry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub link_id: Option<Identifier>,
    #[serde(default)]
    pub from_node: Option<Identifier>,
    #[serde(default)]
    pub to_node: Option<Identifier>,
    pub geometry: LineString<f64>,
    /// Per-vertex elevation, parallel to `geometry`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevations: Option<Vec<f64>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, FieldValue>,
}

impl LinkRecord {
    pub fn new(link_id: Option<Identifier>, geometry: LineString<f64>) -> Self {
        Self {
            link_id,
            from_node: None,
            to_node: None,
            geometry,
            elevations: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_endpoints(mut self, from_node: Option<Identifier>, to_node: Option<Identifier>) -> Self {
        self.from_node = from_node;
        self.to_node = to_node;
        self
    }

    pub fn with_attribute(mut self, name: &str, value: FieldValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn with_elevations(mut self, elevations: Vec<f64>) -> Self {
        self.elevations = Some(elevations);
        self
    }

    pub fn attribute(&self, name: &str) -> &FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        self.attributes.get(name).unwrap_or(&NULL)
    }

    pub fn from_coordinate(&self) -> Option<Coordinate> {
        self.geometry.0.first().copied().map(Coordinate::from)
    }

    pub fn to_coordinate(&self) -> Option<Coordinate> {
        self.geometry.0.last().copied().map(Coordinate::from)
    }

    /// True when every vertex carries an elevation value.
    pub fn has_complete_elevation(&self) -> bool {
        match &self.elevations {
            Some(values) => {
                values.len() == self.geometry.0.len() && values.iter().all(|z| z.is_finite())
            }
            None => false,
        }
    }

    /// Identifier used in user-facing messages: the link id, or the row.
    pub fn label(&self, row_id: RowId) -> String {
        match Identifier::normalize(self.link_id.as_ref()) {
            Some(id) => id.to_string(),
            None => format!("row {}", row_id),
        }
    }
}

/// A network junction or endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: Option<Identifier>,
    pub point: Point<f64>,
}

impl NodeRecord {
    pub fn new(node_id: Option<Identifier>, point: Point<f64>) -> Self {
        Self { node_id, point }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::from(self.point)
    }
}

/// A zone with its fixed centroid anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub zone_id: Identifier,
    pub centroid: Point<f64>,
}

impl ZoneRecord {
    pub fn new(zone_id: Identifier, centroid: Point<f64>) -> Self {
        Self { zone_id, centroid }
    }
}

/// The network node currently standing in for a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentativeNode {
    pub zone_id: Identifier,
    pub node_id: Option<Identifier>,
    pub point: Point<f64>,
}

impl RepresentativeNode {
    pub fn new(zone_id: Identifier, node_id: Option<Identifier>, point: Point<f64>) -> Self {
        Self {
            zone_id,
            node_id,
            point,
        }
    }
}

/// Synthetic link from a zone centroid to its representative node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConnector {
    pub zone_id: Identifier,
    pub node_id: Option<Identifier>,
    pub geometry: Option<LineString<f64>>,
}
