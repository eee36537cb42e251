//! # Identity Collision Resolver
//!
//! Gives every coordinate in a [`NodeMap`] an identifier and makes those
//! identifiers unique. One pass in coordinate order: a running index records
//! which coordinate holds each identifier; when a second coordinate claims a
//! held identifier, the one with more incident links keeps it and the other
//! draws a fresh one. On equal counts the smaller coordinate keeps it.

use crate::idgen::IdGenerator;
use crate::model::{Coordinate, Identifier};
use crate::node_map::NodeMap;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassignmentCause {
    /// No endpoint recorded an identifier here.
    Missing,
    /// Another coordinate kept the identifier.
    Collision { kept_by: Coordinate },
}

/// A coordinate whose identifier was assigned or replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassignment {
    pub coordinate: Coordinate,
    pub previous: Option<Identifier>,
    pub assigned: Identifier,
    pub cause: ReassignmentCause,
}

/// Assign identifiers to null coordinates and split shared identifiers.
///
/// Every identifier already in the map is reserved in `generator` first, so a
/// fresh draw never lands on a value some coordinate still holds.
#[instrument(skip_all, fields(nodes = map.len()))]
pub fn resolve_collisions(map: &mut NodeMap, generator: &mut IdGenerator) -> Vec<Reassignment> {
    let assigned: Vec<Identifier> = map.assigned_ids().cloned().collect();
    generator.reserve(assigned);

    let coordinates: Vec<Coordinate> = map.coordinates().collect();
    let mut holders: HashMap<Identifier, Coordinate> = HashMap::with_capacity(coordinates.len());
    let mut reassignments = Vec::new();

    for coordinate in coordinates {
        let claimed = map.get(&coordinate).and_then(|info| info.node_id.clone());
        let Some(node_id) = claimed else {
            let fresh = draw(generator, &holders);
            assign(map, &coordinate, fresh.clone());
            holders.insert(fresh.clone(), coordinate);
            reassignments.push(Reassignment {
                coordinate,
                previous: None,
                assigned: fresh,
                cause: ReassignmentCause::Missing,
            });
            continue;
        };

        let current_holder = holders.get(&node_id).copied();
        let Some(holder) = current_holder else {
            holders.insert(node_id, coordinate);
            continue;
        };

        let (winner, loser) = if feature_count(map, &coordinate) > feature_count(map, &holder) {
            holders.insert(node_id.clone(), coordinate);
            (coordinate, holder)
        } else {
            (holder, coordinate)
        };

        let fresh = draw(generator, &holders);
        assign(map, &loser, fresh.clone());
        holders.insert(fresh.clone(), loser);
        warn!(
            "{} {} claimed by {} and {}; {} keeps it, {} gets {}.",
            generator.field(),
            node_id,
            holder,
            coordinate,
            winner,
            loser,
            fresh
        );
        reassignments.push(Reassignment {
            coordinate: loser,
            previous: Some(node_id),
            assigned: fresh,
            cause: ReassignmentCause::Collision { kept_by: winner },
        });
    }

    if !reassignments.is_empty() {
        info!(
            "Assigned {} {} value(s) across {} coordinates.",
            reassignments.len(),
            generator.field(),
            map.len()
        );
    }
    reassignments
}

fn feature_count(map: &NodeMap, coordinate: &Coordinate) -> usize {
    map.get(coordinate).map_or(0, |info| info.feature_count())
}

fn assign(map: &mut NodeMap, coordinate: &Coordinate, node_id: Identifier) {
    if let Some(info) = map.get_mut(coordinate) {
        info.node_id = Some(node_id);
    }
}

fn draw(generator: &mut IdGenerator, holders: &HashMap<Identifier, Coordinate>) -> Identifier {
    let fresh = generator.next_id();
    assert!(
        !holders.contains_key(&fresh),
        "fresh identifier {} is already held",
        fresh
    );
    fresh
}
