//! # Coordinate-Node Map
//!
//! Derives node identity from coincident link endpoints. Each distinct
//! endpoint coordinate gets one [`NodeInfo`] holding the links that start and
//! end there and the identifier recorded for it, if any.

use crate::error::NetsyncError;
use crate::filter::{in_scope, RowFilter};
use crate::model::{Coordinate, Identifier, LinkRecord, NodeRecord, RowId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Links incident at a coordinate, split by endpoint role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentLinks {
    pub from: BTreeSet<Identifier>,
    pub to: BTreeSet<Identifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub node_id: Option<Identifier>,
    pub incident_links: IncidentLinks,
}

impl NodeInfo {
    /// Distinct links touching this coordinate. A loop link counts once.
    pub fn feature_count(&self) -> usize {
        self.incident_links
            .from
            .union(&self.incident_links.to)
            .count()
    }

    /// Keep the smaller of the current and offered identifiers; null never
    /// displaces a real identifier.
    fn offer(&mut self, candidate: Option<Identifier>) {
        let Some(candidate) = candidate else {
            return;
        };
        match &self.node_id {
            Some(current) if *current <= candidate => {}
            _ => self.node_id = Some(candidate),
        }
    }
}

/// Whether the map is only read or also gets identifiers assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Identifiers are assumed stable; nulls and collisions are left alone.
    ReadOnly,
    /// Nulls and collisions are resolved after the scan.
    #[default]
    Assign,
}

/// Coordinate → node mapping, iterated in coordinate order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMap {
    nodes: BTreeMap<Coordinate, NodeInfo>,
}

impl NodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan link endpoints. Links outside `filter` are skipped; a link in
    /// scope without an identifier fails with [`NetsyncError::BrokenLinkIdentity`].
    pub fn from_links<'a, I>(links: I, filter: Option<&RowFilter>) -> Result<Self, NetsyncError>
    where
        I: IntoIterator<Item = (RowId, &'a LinkRecord)>,
    {
        let mut map = Self::new();
        let mut scanned = 0usize;
        for (row_id, link) in links {
            if !in_scope(filter, link) {
                continue;
            }
            let link_id = Identifier::normalize(link.link_id.as_ref())
                .ok_or(NetsyncError::BrokenLinkIdentity { row: row_id })?;
            let (Some(from), Some(to)) = (link.from_coordinate(), link.to_coordinate()) else {
                warn!("Skipping link {} with empty geometry.", link_id);
                continue;
            };

            let start = map.nodes.entry(from).or_default();
            start.incident_links.from.insert(link_id.clone());
            start.offer(Identifier::normalize(link.from_node.as_ref()));

            let end = map.nodes.entry(to).or_default();
            end.incident_links.to.insert(link_id);
            end.offer(Identifier::normalize(link.to_node.as_ref()));
            scanned += 1;
        }
        debug!(links = scanned, nodes = map.len(), "built coordinate-node map");
        Ok(map)
    }

    /// Adopt identifiers of prior node records for coordinates that no link
    /// endpoint named. Returns how many coordinates were filled.
    pub fn seed_from_nodes<'a, I>(&mut self, nodes: I) -> usize
    where
        I: IntoIterator<Item = &'a NodeRecord>,
    {
        let mut seeded = 0;
        for node in nodes {
            let Some(node_id) = Identifier::normalize(node.node_id.as_ref()) else {
                continue;
            };
            if let Some(info) = self.nodes.get_mut(&node.coordinate()) {
                if info.node_id.is_none() {
                    info.node_id = Some(node_id);
                    seeded += 1;
                }
            }
        }
        seeded
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<&NodeInfo> {
        self.nodes.get(coordinate)
    }

    pub(crate) fn get_mut(&mut self, coordinate: &Coordinate) -> Option<&mut NodeInfo> {
        self.nodes.get_mut(coordinate)
    }

    pub fn node_id_at(&self, coordinate: &Coordinate) -> Option<&Identifier> {
        self.nodes
            .get(coordinate)
            .and_then(|info| info.node_id.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, &NodeInfo)> + '_ {
        self.nodes.iter()
    }

    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.nodes.keys().copied()
    }

    /// Every non-null identifier currently in the map.
    pub fn assigned_ids(&self) -> impl Iterator<Item = &Identifier> + '_ {
        self.nodes.values().filter_map(|info| info.node_id.as_ref())
    }

    /// Coordinates still lacking an identifier.
    pub fn missing_ids(&self) -> Vec<Coordinate> {
        self.nodes
            .iter()
            .filter(|(_, info)| info.node_id.is_none())
            .map(|(&coordinate, _)| coordinate)
            .collect()
    }

    /// Identifiers claimed by more than one coordinate.
    pub fn duplicate_ids(&self) -> BTreeMap<Identifier, Vec<Coordinate>> {
        let mut claims: HashMap<&Identifier, Vec<Coordinate>> = HashMap::new();
        for (&coordinate, info) in &self.nodes {
            if let Some(node_id) = &info.node_id {
                claims.entry(node_id).or_default().push(coordinate);
            }
        }
        claims
            .into_iter()
            .filter(|(_, coordinates)| coordinates.len() > 1)
            .map(|(node_id, coordinates)| (node_id.clone(), coordinates))
            .collect()
    }

    /// Node rows for every coordinate that has an identifier.
    pub fn node_records(&self) -> Vec<(Identifier, NodeRecord)> {
        self.nodes
            .iter()
            .filter_map(|(coordinate, info)| {
                info.node_id.as_ref().map(|node_id| {
                    (
                        node_id.clone(),
                        NodeRecord::new(Some(node_id.clone()), coordinate.to_point()),
                    )
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point};

    fn link(id: i64, from: (f64, f64), to: (f64, f64), fnode: i64, tnode: i64) -> LinkRecord {
        LinkRecord::new(
            Some(Identifier::Int(id)),
            line_string![(x: from.0, y: from.1), (x: to.0, y: to.1)],
        )
        .with_endpoints(Some(Identifier::Int(fnode)), Some(Identifier::Int(tnode)))
    }

    fn rows(links: &[LinkRecord]) -> impl Iterator<Item = (RowId, &LinkRecord)> {
        links
            .iter()
            .enumerate()
            .map(|(i, link)| (RowId(i as u64 + 1), link))
    }

    #[test]
    fn coincident_endpoints_share_a_node() {
        let links = vec![
            link(1, (0.0, 0.0), (1.0, 0.0), 10, 11),
            link(2, (1.0, 0.0), (2.0, 0.0), 11, 12),
        ];
        let map = NodeMap::from_links(rows(&links), None).unwrap();
        assert_eq!(map.len(), 3);

        let middle = map.get(&Coordinate::new(1.0, 0.0)).unwrap();
        assert_eq!(middle.node_id, Some(Identifier::Int(11)));
        assert!(middle.incident_links.to.contains(&Identifier::Int(1)));
        assert!(middle.incident_links.from.contains(&Identifier::Int(2)));
        assert_eq!(middle.feature_count(), 2);
    }

    #[test]
    fn smaller_identifier_wins_and_null_never_does() {
        let links = vec![
            link(1, (0.0, 0.0), (1.0, 0.0), 10, 30),
            link(2, (1.0, 0.0), (2.0, 0.0), 20, 0),
            link(3, (2.0, 0.0), (1.0, 0.0), 0, 25),
        ];
        let map = NodeMap::from_links(rows(&links), None).unwrap();
        assert_eq!(
            map.node_id_at(&Coordinate::new(1.0, 0.0)),
            Some(&Identifier::Int(20))
        );
        assert_eq!(map.node_id_at(&Coordinate::new(2.0, 0.0)), None);
        assert_eq!(map.missing_ids(), vec![Coordinate::new(2.0, 0.0)]);
    }

    #[test]
    fn loop_link_counts_once() {
        let links = vec![link(7, (3.0, 3.0), (3.0, 3.0), 1, 1)];
        let map = NodeMap::from_links(rows(&links), None).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Coordinate::new(3.0, 3.0)).unwrap().feature_count(), 1);
    }

    #[test]
    fn filter_limits_scope() {
        let links = vec![
            link(1, (0.0, 0.0), (1.0, 0.0), 1, 2)
                .with_attribute("mode", crate::model::FieldValue::Text("walk".to_string())),
            link(2, (5.0, 5.0), (6.0, 5.0), 3, 4),
        ];
        let filter = RowFilter::parse("mode = 'walk'").unwrap();
        let map = NodeMap::from_links(rows(&links), Some(&filter)).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.get(&Coordinate::new(5.0, 5.0)).is_none());
    }

    #[test]
    fn unidentified_link_is_rejected() {
        let links = vec![LinkRecord::new(None, line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)])];
        let err = NodeMap::from_links(rows(&links), None).unwrap_err();
        assert!(matches!(err, NetsyncError::BrokenLinkIdentity { row: RowId(1) }));
    }

    #[test]
    fn prior_nodes_fill_only_missing_ids() {
        let links = vec![link(1, (0.0, 0.0), (1.0, 0.0), 0, 5)];
        let mut map = NodeMap::from_links(rows(&links), None).unwrap();
        let prior = vec![
            NodeRecord::new(Some(Identifier::Int(42)), point!(x: 0.0, y: 0.0)),
            NodeRecord::new(Some(Identifier::Int(43)), point!(x: 1.0, y: 0.0)),
        ];
        assert_eq!(map.seed_from_nodes(&prior), 1);
        assert_eq!(map.node_id_at(&Coordinate::new(0.0, 0.0)), Some(&Identifier::Int(42)));
        assert_eq!(map.node_id_at(&Coordinate::new(1.0, 0.0)), Some(&Identifier::Int(5)));
    }

    #[test]
    fn duplicates_are_reported() {
        let links = vec![
            link(1, (0.0, 0.0), (1.0, 0.0), 9, 2),
            link(2, (4.0, 0.0), (5.0, 0.0), 9, 3),
        ];
        let map = NodeMap::from_links(rows(&links), None).unwrap();
        let duplicates = map.duplicate_ids();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[&Identifier::Int(9)].len(), 2);
    }
}
