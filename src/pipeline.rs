//! # Node Identity Pipeline
//!
//! Link endpoints → stabilized coordinate map → node table and link endpoint
//! fields. The map is built fresh every run and discarded afterwards; stable
//! node identifiers survive only through what the links (and, optionally,
//! prior node rows) record.

use crate::collision::{resolve_collisions, Reassignment};
use crate::config::FieldNames;
use crate::error::NetsyncError;
use crate::filter::RowFilter;
use crate::idgen::IdGenerator;
use crate::links::reconcile_link_endpoints;
use crate::model::{Identifier, LinkRecord, NodeRecord, RowId};
use crate::node_map::{BuildMode, NodeMap};
use crate::reconcile::{
    reconcile_collection, AuditEntry, FieldChange, ReconcileRule, ReconciliationDelta,
};
use crate::store::FeatureTable;
use geo::Point;
use std::fmt;
use tracing::{debug, info, instrument};

/// Node rows keyed by node identifier; geometry compared by coincidence.
pub(crate) struct NodeRule<'a> {
    pub(crate) fields: &'a FieldNames,
}

struct PointDisplay(Point<f64>);

impl fmt::Display for PointDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POINT ({} {})", self.0.x(), self.0.y())
    }
}

impl PartialEq for PointDisplay {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// Audit rendering of a point-valued field.
pub(crate) fn point_change(field: &str, old: Point<f64>, new: Point<f64>) -> Option<FieldChange> {
    FieldChange::compare(field, &PointDisplay(old), &PointDisplay(new))
}

impl ReconcileRule<NodeRecord> for NodeRule<'_> {
    type Key = Identifier;

    fn key_name(&self) -> &str {
        &self.fields.node_id
    }

    fn persisted_key(&self, _row_id: RowId, row: &NodeRecord) -> Option<Identifier> {
        Identifier::normalize(row.node_id.as_ref())
    }

    fn diff(&self, current: &NodeRecord, target: &NodeRecord) -> Vec<FieldChange> {
        point_change("geometry", current.point, target.point)
            .into_iter()
            .collect()
    }
}

/// Settings for one node identity run.
#[derive(Debug, Clone, Default)]
pub struct NodeIdentityOptions {
    pub filter: Option<RowFilter>,
    pub seed_from_nodes: bool,
    pub fields: FieldNames,
}

/// Result of [`reconcile_node_identity`].
#[derive(Debug, Clone, Default)]
pub struct NodeIdentityReport {
    pub nodes: ReconciliationDelta,
    pub links: ReconciliationDelta,
    pub reassignments: Vec<Reassignment>,
}

impl NodeIdentityReport {
    pub fn new_count(&self) -> usize {
        self.nodes.inserted + self.links.inserted
    }

    pub fn changed_count(&self) -> usize {
        self.nodes.changed + self.links.changed
    }

    pub fn deleted_count(&self) -> usize {
        self.nodes.deleted + self.links.deleted
    }

    /// Node changes first, then link endpoint changes.
    pub fn audit_log(&self) -> impl Iterator<Item = &AuditEntry> + '_ {
        self.nodes.audit.iter().chain(self.links.audit.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

/// Build the coordinate map from links; in assign mode also resolve nulls and
/// collisions.
pub fn build_node_map<'a, I, N>(
    links: I,
    prior_nodes: Option<N>,
    filter: Option<&RowFilter>,
    mode: BuildMode,
    generator: &mut IdGenerator,
) -> Result<(NodeMap, Vec<Reassignment>), NetsyncError>
where
    I: IntoIterator<Item = (RowId, &'a LinkRecord)>,
    N: IntoIterator<Item = &'a NodeRecord>,
{
    let mut map = NodeMap::from_links(links, filter)?;
    if let Some(prior_nodes) = prior_nodes {
        let seeded = map.seed_from_nodes(prior_nodes);
        debug!(seeded, "seeded node ids from prior node rows");
    }
    let reassignments = match mode {
        BuildMode::ReadOnly => Vec::new(),
        BuildMode::Assign => resolve_collisions(&mut map, generator),
    };
    Ok((map, reassignments))
}

/// Derive node identity from links and write it to `nodes` and back to the
/// link endpoint fields.
///
/// Links must already carry unique identifiers (see
/// [`crate::links::repair_link_identity`]).
#[instrument(skip_all)]
pub fn reconcile_node_identity<L, N>(
    links: &mut L,
    nodes: &mut N,
    options: &NodeIdentityOptions,
    generator: &mut IdGenerator,
) -> Result<NodeIdentityReport, NetsyncError>
where
    L: FeatureTable<LinkRecord> + ?Sized,
    N: FeatureTable<NodeRecord> + ?Sized,
{
    let link_rows = links.scan();
    let prior_rows = if options.seed_from_nodes {
        nodes.scan()
    } else {
        Vec::new()
    };
    let (map, reassignments) = build_node_map(
        link_rows.iter().map(|(row_id, link)| (*row_id, link)),
        options
            .seed_from_nodes
            .then(|| prior_rows.iter().map(|(_, node)| node)),
        options.filter.as_ref(),
        BuildMode::Assign,
        generator,
    )?;

    let node_delta = reconcile_collection(nodes, map.node_records(), &NodeRule {
        fields: &options.fields,
    })?;
    let link_delta =
        reconcile_link_endpoints(links, &map, options.filter.as_ref(), &options.fields)?;

    let report = NodeIdentityReport {
        nodes: node_delta,
        links: link_delta,
        reassignments,
    };
    info!(
        "Node identity: {} new, {} changed, {} deleted across {} nodes.",
        report.new_count(),
        report.changed_count(),
        report.deleted_count(),
        map.len()
    );
    Ok(report)
}
