//! # Zone Layers
//!
//! Keeps the zone-representative nodes and zone connectors in step with the
//! network: each representative is re-snapped to the nearest current node,
//! then each zone's connector is rebuilt from its centroid to that node.

use crate::config::FieldNames;
use crate::connector::{synthesize_connector, DegenerateGeometry};
use crate::error::NetsyncError;
use crate::model::{
    display_optional, Identifier, NodeRecord, RepresentativeNode, RowId, ZoneConnector, ZoneRecord,
};
use crate::pipeline::point_change;
use crate::reconcile::{reconcile_collection, FieldChange, ReconcileRule, ReconciliationDelta};
use crate::store::FeatureTable;
use geo::{LineString, Point};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{instrument, warn};

/// Nearest-node lookup over the current node set.
pub struct NodeLocator {
    tree: RTree<GeomWithData<[f64; 2], Identifier>>,
}

impl NodeLocator {
    pub fn from_nodes<'a, I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = &'a NodeRecord>,
    {
        let entries: Vec<_> = nodes
            .into_iter()
            .filter_map(|node| {
                Identifier::normalize(node.node_id.as_ref())
                    .map(|node_id| GeomWithData::new([node.point.x(), node.point.y()], node_id))
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Nearest node to `point`; equidistant candidates resolve to the
    /// smallest identifier.
    pub fn nearest(&self, point: Point<f64>) -> Option<(Identifier, Point<f64>)> {
        let query = [point.x(), point.y()];
        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&query);
        let (first, best_distance) = candidates.next()?;
        let mut best = first;
        for (entry, distance) in candidates {
            if distance > best_distance {
                break;
            }
            if entry.data < best.data {
                best = entry;
            }
        }
        let [x, y] = *best.geom();
        Some((best.data.clone(), Point::new(x, y)))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

struct RepresentativeRule<'a> {
    fields: &'a FieldNames,
}

impl ReconcileRule<RepresentativeNode> for RepresentativeRule<'_> {
    type Key = Identifier;

    fn key_name(&self) -> &str {
        &self.fields.zone_id
    }

    fn persisted_key(&self, _row_id: RowId, row: &RepresentativeNode) -> Option<Identifier> {
        Identifier::normalize(Some(&row.zone_id))
    }

    fn diff(&self, current: &RepresentativeNode, target: &RepresentativeNode) -> Vec<FieldChange> {
        [
            FieldChange::compare_optional(
                &self.fields.node_id,
                current.node_id.as_ref(),
                target.node_id.as_ref(),
            ),
            point_change("geometry", current.point, target.point),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

struct LineDisplay<'a>(Option<&'a LineString<f64>>);

impl fmt::Display for LineDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(line) = self.0 else {
            return f.write_str("None");
        };
        f.write_str("LINESTRING (")?;
        for (i, coord) in line.coords().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", coord.x, coord.y)?;
        }
        f.write_str(")")
    }
}

impl PartialEq for LineDisplay<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

struct ConnectorRule<'a> {
    fields: &'a FieldNames,
}

impl ReconcileRule<ZoneConnector> for ConnectorRule<'_> {
    type Key = Identifier;

    fn key_name(&self) -> &str {
        &self.fields.zone_id
    }

    fn persisted_key(&self, _row_id: RowId, row: &ZoneConnector) -> Option<Identifier> {
        Identifier::normalize(Some(&row.zone_id))
    }

    fn diff(&self, current: &ZoneConnector, target: &ZoneConnector) -> Vec<FieldChange> {
        [
            FieldChange::compare_optional(
                &self.fields.node_id,
                current.node_id.as_ref(),
                target.node_id.as_ref(),
            ),
            FieldChange::compare(
                "geometry",
                &LineDisplay(current.geometry.as_ref()),
                &LineDisplay(target.geometry.as_ref()),
            ),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Result of [`resnap_representatives`].
#[derive(Debug, Clone, Default)]
pub struct ResnapOutcome {
    pub delta: ReconciliationDelta,
    /// Resolved representative per zone, in zone order.
    pub representatives: BTreeMap<Identifier, RepresentativeNode>,
}

/// Re-snap every zone's representative to the nearest current node.
///
/// Every zone must already have a representative row; representatives of
/// zones that no longer exist are deleted.
#[instrument(skip_all, fields(zones = zones.len()))]
pub fn resnap_representatives<T>(
    zones: &[ZoneRecord],
    representatives: &mut T,
    locator: &NodeLocator,
    fields: &FieldNames,
) -> Result<ResnapOutcome, NetsyncError>
where
    T: FeatureTable<RepresentativeNode> + ?Sized,
{
    let mut existing: BTreeMap<Identifier, RepresentativeNode> = BTreeMap::new();
    for (_, row) in representatives.scan() {
        existing.entry(row.zone_id.clone()).or_insert(row);
    }

    let mut ordered: Vec<&ZoneRecord> = zones.iter().collect();
    ordered.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));

    let mut resolved = BTreeMap::new();
    for zone in ordered {
        let Some(current) = existing.get(&zone.zone_id) else {
            return Err(NetsyncError::IncompleteCoverage {
                zone: zone.zone_id.to_string(),
                layer: representatives.name().to_string(),
            });
        };
        let target = match locator.nearest(current.point) {
            Some((node_id, point)) => RepresentativeNode::new(zone.zone_id.clone(), Some(node_id), point),
            None => {
                warn!(
                    "No network node to snap {}={} to.",
                    fields.zone_id, zone.zone_id
                );
                RepresentativeNode::new(zone.zone_id.clone(), None, current.point)
            }
        };
        resolved.insert(zone.zone_id.clone(), target);
    }

    let target = resolved
        .iter()
        .map(|(zone_id, row)| (zone_id.clone(), row.clone()))
        .collect();
    let delta = reconcile_collection(representatives, target, &RepresentativeRule { fields })?;
    Ok(ResnapOutcome {
        delta,
        representatives: resolved,
    })
}

/// Result of [`reconcile_connectors`].
#[derive(Debug, Clone, Default)]
pub struct ConnectorOutcome {
    pub delta: ReconciliationDelta,
    pub warnings: Vec<(Identifier, DegenerateGeometry)>,
}

/// Rebuild each zone's connector from its centroid to its representative.
#[instrument(skip_all, fields(zones = zones.len()))]
pub fn reconcile_connectors<T>(
    zones: &[ZoneRecord],
    representatives: &BTreeMap<Identifier, RepresentativeNode>,
    connectors: &mut T,
    fields: &FieldNames,
) -> Result<ConnectorOutcome, NetsyncError>
where
    T: FeatureTable<ZoneConnector> + ?Sized,
{
    let mut ordered: Vec<&ZoneRecord> = zones.iter().collect();
    ordered.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));
    ordered.dedup_by(|a, b| a.zone_id == b.zone_id);

    let mut warnings = Vec::new();
    let mut target = Vec::with_capacity(ordered.len());
    for zone in ordered {
        let representative = representatives
            .get(&zone.zone_id)
            .filter(|row| row.node_id.is_some());
        let built = synthesize_connector(zone.centroid, representative.map(|row| row.point));
        if let Some(warning) = built.warning {
            warn!(
                "Connector for {}={} (node {}): {}.",
                fields.zone_id,
                zone.zone_id,
                display_optional(representative.and_then(|row| row.node_id.as_ref())),
                warning
            );
            warnings.push((zone.zone_id.clone(), warning));
        }
        target.push((
            zone.zone_id.clone(),
            ZoneConnector {
                zone_id: zone.zone_id.clone(),
                node_id: representative.and_then(|row| row.node_id.clone()),
                geometry: built.geometry,
            },
        ));
    }

    let delta = reconcile_collection(connectors, target, &ConnectorRule { fields })?;
    Ok(ConnectorOutcome { delta, warnings })
}
