//! # Link Identity
//!
//! Link identity repair runs before anything else derives from links: every
//! link must carry an identifier no other link carries. Also holds the
//! elevation guard and the endpoint-attribute reconciliation that writes node
//! identifiers back onto links.

use crate::config::FieldNames;
use crate::error::NetsyncError;
use crate::filter::{in_scope, RowFilter};
use crate::idgen::IdGenerator;
use crate::model::{Identifier, LinkRecord, RowId};
use crate::node_map::NodeMap;
use crate::reconcile::{reconcile_collection, FieldChange, ReconcileRule, ReconciliationDelta};
use crate::store::FeatureTable;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, instrument};

/// Link rows keyed by storage handle; only the identifier is compared.
struct LinkRowRule<'a> {
    fields: &'a FieldNames,
}

impl ReconcileRule<LinkRecord> for LinkRowRule<'_> {
    type Key = RowId;

    fn key_name(&self) -> &str {
        &self.fields.row_id
    }

    fn persisted_key(&self, row_id: RowId, _row: &LinkRecord) -> Option<RowId> {
        Some(row_id)
    }

    fn diff(&self, current: &LinkRecord, target: &LinkRecord) -> Vec<FieldChange> {
        FieldChange::compare_optional(
            &self.fields.link_id,
            current.link_id.as_ref(),
            target.link_id.as_ref(),
        )
        .into_iter()
        .collect()
    }
}

/// Link rows keyed by link identifier; only endpoint fields are compared.
struct LinkEndpointRule<'a> {
    fields: &'a FieldNames,
}

impl ReconcileRule<LinkRecord> for LinkEndpointRule<'_> {
    type Key = Identifier;

    fn key_name(&self) -> &str {
        &self.fields.link_id
    }

    fn persisted_key(&self, _row_id: RowId, row: &LinkRecord) -> Option<Identifier> {
        Identifier::normalize(row.link_id.as_ref())
    }

    fn diff(&self, current: &LinkRecord, target: &LinkRecord) -> Vec<FieldChange> {
        [
            FieldChange::compare_optional(
                &self.fields.from_node,
                current.from_node.as_ref(),
                target.from_node.as_ref(),
            ),
            FieldChange::compare_optional(
                &self.fields.to_node,
                current.to_node.as_ref(),
                target.to_node.as_ref(),
            ),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Give every link a unique identifier.
///
/// Rows are visited in row order; the first row carrying an identifier keeps
/// it, later duplicates and rows without one draw fresh values.
#[instrument(skip_all, fields(table = links.name()))]
pub fn repair_link_identity<T>(
    links: &mut T,
    generator: &mut IdGenerator,
    fields: &FieldNames,
) -> Result<ReconciliationDelta, NetsyncError>
where
    T: FeatureTable<LinkRecord> + ?Sized,
{
    let rows = links.scan();
    generator.reserve(
        rows.iter()
            .filter_map(|(_, link)| Identifier::normalize(link.link_id.as_ref())),
    );

    let mut seen: HashSet<Identifier> = HashSet::with_capacity(rows.len());
    let mut target = Vec::with_capacity(rows.len());
    for (row_id, mut link) in rows {
        let current = Identifier::normalize(link.link_id.as_ref());
        let keeps = matches!(&current, Some(id) if seen.insert(id.clone()));
        if !keeps {
            let fresh = generator.next_id();
            seen.insert(fresh.clone());
            link.link_id = Some(fresh);
        }
        target.push((row_id, link));
    }

    let delta = reconcile_collection(links, target, &LinkRowRule { fields })?;
    if delta.changed > 0 {
        info!("Repaired {} {} value(s).", delta.changed, fields.link_id);
    }
    Ok(delta)
}

/// Fail if any in-scope link lacks an elevation on some vertex.
pub fn require_elevation<'a, I>(links: I, filter: Option<&RowFilter>) -> Result<(), NetsyncError>
where
    I: IntoIterator<Item = (RowId, &'a LinkRecord)>,
{
    for (row_id, link) in links {
        if in_scope(filter, link) && !link.has_complete_elevation() {
            return Err(NetsyncError::MissingZCoordinate {
                link: link.label(row_id),
            });
        }
    }
    Ok(())
}

/// Write node identifiers from `map` onto link endpoints.
///
/// Links outside `filter` are carried unchanged. Every link needs a unique
/// identifier, since links are keyed by it.
#[instrument(skip_all, fields(table = links.name()))]
pub fn reconcile_link_endpoints<T>(
    links: &mut T,
    map: &NodeMap,
    filter: Option<&RowFilter>,
    fields: &FieldNames,
) -> Result<ReconciliationDelta, NetsyncError>
where
    T: FeatureTable<LinkRecord> + ?Sized,
{
    let mut target: BTreeMap<Identifier, (usize, LinkRecord)> = BTreeMap::new();
    for (order, (row_id, mut link)) in links.scan().into_iter().enumerate() {
        let link_id = Identifier::normalize(link.link_id.as_ref())
            .ok_or(NetsyncError::BrokenLinkIdentity { row: row_id })?;
        if in_scope(filter, &link) {
            link.from_node = link
                .from_coordinate()
                .and_then(|coordinate| map.node_id_at(&coordinate).cloned());
            link.to_node = link
                .to_coordinate()
                .and_then(|coordinate| map.node_id_at(&coordinate).cloned());
        }
        if target.insert(link_id, (order, link)).is_some() {
            return Err(NetsyncError::BrokenLinkIdentity { row: row_id });
        }
    }

    let mut target: Vec<(Identifier, (usize, LinkRecord))> = target.into_iter().collect();
    target.sort_by_key(|(_, (order, _))| *order);
    let target = target
        .into_iter()
        .map(|(link_id, (_, link))| (link_id, link))
        .collect();

    reconcile_collection(links, target, &LinkEndpointRule { fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coordinate;
    use crate::store::Table;
    use geo::line_string;

    fn segment(link_id: Option<i64>, x: f64) -> LinkRecord {
        LinkRecord::new(
            link_id.map(Identifier::Int),
            line_string![(x: x, y: 0.0), (x: x + 1.0, y: 0.0)],
        )
    }

    #[test]
    fn repair_keeps_first_occurrence_and_fills_gaps() {
        let mut links = Table::from_rows(
            "links",
            vec![
                segment(Some(4), 0.0),
                segment(None, 1.0),
                segment(Some(4), 2.0),
                segment(Some(0), 3.0),
                segment(Some(1), 4.0),
            ],
        );
        let fields = FieldNames::default();
        let mut generator = IdGenerator::integer("link_id");
        let delta = repair_link_identity(&mut links, &mut generator, &fields).unwrap();

        assert_eq!(delta.changed, 3);
        assert_eq!(delta.inserted + delta.deleted, 0);
        let ids: Vec<Identifier> = links
            .values()
            .map(|link| link.link_id.clone().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![
                Identifier::Int(4),
                Identifier::Int(2),
                Identifier::Int(3),
                Identifier::Int(5),
                Identifier::Int(1),
            ]
        );
        assert_eq!(
            delta.audit[0].to_string(),
            "Changed link_id=None --> 2 for OBJECTID=2."
        );
    }

    #[test]
    fn repair_of_clean_links_writes_nothing() {
        let mut links = Table::from_rows("links", vec![segment(Some(1), 0.0), segment(Some(2), 1.0)]);
        let mut generator = IdGenerator::integer("link_id");
        let delta = repair_link_identity(&mut links, &mut generator, &FieldNames::default()).unwrap();
        assert!(delta.is_empty());
        assert_eq!(links.stats().total(), 0);
    }

    #[test]
    fn elevation_guard_names_the_link() {
        let links = Table::from_rows(
            "links",
            vec![
                segment(Some(1), 0.0).with_elevations(vec![1.0, 2.0]),
                segment(Some(2), 1.0).with_elevations(vec![1.0]),
            ],
        );
        let err = require_elevation(links.iter(), None).unwrap_err();
        match err {
            NetsyncError::MissingZCoordinate { link } => assert_eq!(link, "2"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn endpoints_follow_the_node_map() {
        let mut links = Table::from_rows(
            "links",
            vec![segment(Some(1), 0.0).with_endpoints(Some(Identifier::Int(8)), None)],
        );
        let mut map = NodeMap::from_links(links.iter(), None).unwrap();
        let mut generator = IdGenerator::integer("node_id");
        crate::collision::resolve_collisions(&mut map, &mut generator);
        assert_eq!(map.node_id_at(&Coordinate::new(0.0, 0.0)), Some(&Identifier::Int(8)));

        let delta = reconcile_link_endpoints(&mut links, &map, None, &FieldNames::default()).unwrap();
        assert_eq!(delta.changed, 1);
        assert_eq!(
            delta.audit[0].to_string(),
            "Changed tnode=None --> 1 for link_id=1."
        );
        let link = links.get(RowId(1)).unwrap();
        assert_eq!(link.to_node, Some(Identifier::Int(1)));
    }

    #[test]
    fn endpoint_reconciliation_rejects_duplicate_links() {
        let mut links = Table::from_rows("links", vec![segment(Some(1), 0.0), segment(Some(1), 5.0)]);
        let map = NodeMap::new();
        let err = reconcile_link_endpoints(&mut links, &map, None, &FieldNames::default()).unwrap_err();
        assert!(matches!(err, NetsyncError::BrokenLinkIdentity { row: RowId(2) }));
    }
}
