//! # Netsync
//!
//! Stable identity for the nodes and links of a geometric network whose
//! geometry is re-derived or hand-edited between runs.
//!
//! Node identity comes from coincident link endpoints. Identifiers already in
//! use survive re-runs unless two coordinates claim the same one, and every
//! persisted layer is brought up to date through one diff/upsert engine that
//! writes only what changed and logs every changed field.

pub mod collision;
pub mod config;
pub mod connector;
pub mod error;
pub mod filter;
pub mod idgen;
pub mod links;
pub mod model;
pub mod node_map;
pub mod overlay;
pub mod persistence;
pub mod pipeline;
pub mod reconcile;
pub mod store;
pub mod test_support;
pub mod zones;

// Re-export main types for convenience
pub use config::{ConfigOverrides, NetsyncConfig};
pub use connector::{synthesize_connector, DegenerateGeometry, SynthesizedConnector};
pub use error::NetsyncError;
pub use idgen::{FieldType, IdGenerator};
pub use model::{
    Coordinate, FieldValue, Identifier, LinkRecord, NodeRecord, RepresentativeNode, RowId,
    ZoneConnector, ZoneRecord,
};
pub use node_map::{BuildMode, NodeInfo, NodeMap};
pub use overlay::{resolve_dominant, DominantOverlay};
pub use persistence::Dataset;
pub use pipeline::{reconcile_node_identity, NodeIdentityOptions, NodeIdentityReport};
pub use reconcile::{reconcile_collection, AuditEntry, ReconcileRule, ReconciliationDelta};
pub use store::{FeatureTable, Table};

use collision::ReassignmentCause;
use tracing::{info, instrument};
use zones::NodeLocator;

/// Everything one [`Netsync::run`] changed.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub link_repair: ReconciliationDelta,
    pub node_identity: NodeIdentityReport,
    pub representatives: ReconciliationDelta,
    pub connectors: ReconciliationDelta,
    pub connector_warnings: Vec<(Identifier, DegenerateGeometry)>,
}

impl RunSummary {
    /// Every audit line of the run, in pipeline order.
    pub fn audit_log(&self) -> impl Iterator<Item = &AuditEntry> + '_ {
        self.link_repair
            .audit
            .iter()
            .chain(self.node_identity.audit_log())
            .chain(self.representatives.audit.iter())
            .chain(self.connectors.audit.iter())
    }

    pub fn inserted(&self) -> usize {
        self.link_repair.inserted
            + self.node_identity.new_count()
            + self.representatives.inserted
            + self.connectors.inserted
    }

    pub fn changed(&self) -> usize {
        self.link_repair.changed
            + self.node_identity.changed_count()
            + self.representatives.changed
            + self.connectors.changed
    }

    pub fn deleted(&self) -> usize {
        self.link_repair.deleted
            + self.node_identity.deleted_count()
            + self.representatives.deleted
            + self.connectors.deleted
    }

    /// True when the run wrote nothing.
    pub fn is_empty(&self) -> bool {
        self.inserted() == 0 && self.changed() == 0 && self.deleted() == 0
    }
}

/// Identity problems found without writing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityCheck {
    pub missing: Vec<Coordinate>,
    pub duplicates: Vec<(Identifier, Vec<Coordinate>)>,
}

impl IdentityCheck {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.duplicates.is_empty()
    }
}

/// Main entry point: runs the reconciliation pipeline over a dataset.
pub struct Netsync {
    config: NetsyncConfig,
}

impl Netsync {
    pub fn new(config: NetsyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NetsyncConfig {
        &self.config
    }

    /// Repair links, derive node identity, re-snap zone representatives and
    /// rebuild connectors.
    ///
    /// Link repair always precedes node derivation. With `require_elevation`
    /// set, a link lacking elevation stops the run before anything is
    /// written.
    #[instrument(skip_all)]
    pub fn run(&self, dataset: &mut Dataset) -> Result<RunSummary, NetsyncError> {
        let fields = &self.config.fields;
        let filter = self.config.link_filter()?;
        let mut link_ids = self.config.link_id_generator()?;
        let mut node_ids = self.config.node_id_generator()?;

        if self.config.pipeline.require_elevation {
            links::require_elevation(dataset.links.iter(), filter.as_ref())?;
        }

        let link_repair = links::repair_link_identity(&mut dataset.links, &mut link_ids, fields)?;

        let options = NodeIdentityOptions {
            filter,
            seed_from_nodes: self.config.pipeline.seed_from_nodes,
            fields: fields.clone(),
        };
        let node_identity =
            reconcile_node_identity(&mut dataset.links, &mut dataset.nodes, &options, &mut node_ids)?;

        let mut summary = RunSummary {
            link_repair,
            node_identity,
            ..RunSummary::default()
        };

        // Empty zone layers still reconcile, clearing stale rows.
        let locator = NodeLocator::from_nodes(dataset.nodes.values());
        let resnap = zones::resnap_representatives(
            &dataset.zones,
            &mut dataset.representatives,
            &locator,
            fields,
        )?;
        let connectors = zones::reconcile_connectors(
            &dataset.zones,
            &resnap.representatives,
            &mut dataset.connectors,
            fields,
        )?;
        summary.representatives = resnap.delta;
        summary.connectors = connectors.delta;
        summary.connector_warnings = connectors.warnings;

        let collisions = summary
            .node_identity
            .reassignments
            .iter()
            .filter(|r| matches!(r.cause, ReassignmentCause::Collision { .. }))
            .count();
        info!(
            "Run complete: {} inserted, {} changed, {} deleted, {} node id collision(s).",
            summary.inserted(),
            summary.changed(),
            summary.deleted(),
            collisions
        );
        Ok(summary)
    }

    /// Inspect node identity as currently recorded on links, read-only.
    pub fn check(&self, dataset: &Dataset) -> Result<IdentityCheck, NetsyncError> {
        let filter = self.config.link_filter()?;
        let mut unused = IdGenerator::integer(&self.config.fields.node_id);
        let (map, _) = pipeline::build_node_map(
            dataset.links.iter(),
            None::<Vec<&NodeRecord>>,
            filter.as_ref(),
            BuildMode::ReadOnly,
            &mut unused,
        )?;
        Ok(IdentityCheck {
            missing: map.missing_ids(),
            duplicates: map.duplicate_ids().into_iter().collect(),
        })
    }

    /// Dominant overlay value for a link, falling back to the configured
    /// default.
    pub fn dominant_overlay_value(
        &self,
        link: &LinkRecord,
        features: &[overlay::OverlayFeature<String>],
    ) -> Option<String> {
        let contributions = overlay::overlap_contributions(&link.geometry, features);
        resolve_dominant(contributions).or_else(|| self.config.overlay.default_value.clone())
    }
}

impl Default for Netsync {
    fn default() -> Self {
        Self::new(NetsyncConfig::default())
    }
}
