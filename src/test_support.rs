use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{Identifier, LinkRecord, NodeRecord, RepresentativeNode, RowId, ZoneRecord};
use crate::persistence::{
    Dataset, CONNECTORS_TABLE, LINKS_TABLE, NODES_TABLE, REPRESENTATIVES_TABLE,
};
use crate::store::Table;
use geo::{line_string, Point};

/// A square grid network with consistent identity, ready to be corrupted.
#[derive(Debug, Clone)]
pub struct GeneratedNetwork {
    pub dataset: Dataset,
    #[allow(dead_code)]
    pub side: u32,
    #[allow(dead_code)]
    pub spacing: f64,
}

impl GeneratedNetwork {
    #[allow(dead_code)]
    pub fn node_count(&self) -> usize {
        (self.side as usize) * (self.side as usize)
    }

    #[allow(dead_code)]
    pub fn link_count(&self) -> usize {
        2 * (self.side as usize) * (self.side as usize - 1)
    }
}

fn node_number(side: u32, col: u32, row: u32) -> i64 {
    (row * side + col) as i64 + 1
}

/// Grid of `side x side` nodes joined by horizontal and vertical links.
///
/// Every node, link and endpoint carries its identifier, elevations are
/// complete, and one zone sits inside each grid cell with its representative
/// on the cell's lower-left corner.
pub fn generate_network(side: u32, spacing: f64, seed: u64) -> GeneratedNetwork {
    assert!(side >= 2, "a grid needs at least two nodes per side");
    let mut rng = StdRng::seed_from_u64(seed);

    let mut nodes = Vec::new();
    for row in 0..side {
        for col in 0..side {
            nodes.push(NodeRecord::new(
                Some(Identifier::Int(node_number(side, col, row))),
                Point::new(col as f64 * spacing, row as f64 * spacing),
            ));
        }
    }

    let mut links = Vec::new();
    let mut next_link = 1i64;
    for row in 0..side {
        for col in 0..side {
            let x = col as f64 * spacing;
            let y = row as f64 * spacing;
            let here = node_number(side, col, row);
            let mut neighbours = Vec::new();
            if col + 1 < side {
                neighbours.push((x + spacing, y, node_number(side, col + 1, row)));
            }
            if row + 1 < side {
                neighbours.push((x, y + spacing, node_number(side, col, row + 1)));
            }
            for (nx, ny, there) in neighbours {
                let z: f64 = rng.random_range(0.0..50.0);
                links.push(
                    LinkRecord::new(
                        Some(Identifier::Int(next_link)),
                        line_string![(x: x, y: y), (x: nx, y: ny)],
                    )
                    .with_endpoints(Some(Identifier::Int(here)), Some(Identifier::Int(there)))
                    .with_elevations(vec![z, z + rng.random_range(-1.0..1.0)]),
                );
                next_link += 1;
            }
        }
    }

    let mut zones = Vec::new();
    let mut representatives = Vec::new();
    let mut next_zone = 1i64;
    for row in 0..side - 1 {
        for col in 0..side - 1 {
            let x = col as f64 * spacing;
            let y = row as f64 * spacing;
            let zone_id = Identifier::Int(next_zone);
            zones.push(ZoneRecord::new(
                zone_id.clone(),
                Point::new(x + spacing / 2.0, y + spacing / 2.0),
            ));
            representatives.push(RepresentativeNode::new(
                zone_id,
                Some(Identifier::Int(node_number(side, col, row))),
                Point::new(x, y),
            ));
            next_zone += 1;
        }
    }

    GeneratedNetwork {
        dataset: Dataset {
            links: Table::from_rows(LINKS_TABLE, links),
            nodes: Table::from_rows(NODES_TABLE, nodes),
            zones,
            representatives: Table::from_rows(REPRESENTATIVES_TABLE, representatives),
            connectors: Table::new(CONNECTORS_TABLE),
        },
        side,
        spacing,
    }
}

/// Clear a random share of link endpoint identifiers.
#[allow(dead_code)]
pub fn clear_endpoints(dataset: &mut Dataset, probability: f64, seed: u64) -> usize {
    let mut rng = StdRng::seed_from_u64(seed);
    let row_ids: Vec<RowId> = dataset.links.iter().map(|(row_id, _)| row_id).collect();
    let mut cleared = 0;
    for row_id in row_ids {
        if let Some(link) = dataset.links.get_mut(row_id) {
            if rng.random_bool(probability) {
                link.from_node = None;
                cleared += 1;
            }
            if rng.random_bool(probability) {
                link.to_node = None;
                cleared += 1;
            }
        }
    }
    cleared
}

/// Copy the identifier of the first link onto `count` later links.
#[allow(dead_code)]
pub fn duplicate_link_ids(dataset: &mut Dataset, count: usize) {
    let row_ids: Vec<RowId> = dataset.links.iter().map(|(row_id, _)| row_id).collect();
    let Some(first) = row_ids
        .first()
        .and_then(|row_id| dataset.links.get(*row_id))
        .and_then(|link| link.link_id.clone())
    else {
        return;
    };
    for row_id in row_ids.into_iter().skip(1).take(count) {
        if let Some(link) = dataset.links.get_mut(row_id) {
            link.link_id = Some(first.clone());
        }
    }
}

/// Move one grid node and every link end touching it.
#[allow(dead_code)]
pub fn move_node(dataset: &mut Dataset, from: Point<f64>, to: Point<f64>) {
    let row_ids: Vec<RowId> = dataset.links.iter().map(|(row_id, _)| row_id).collect();
    for row_id in row_ids {
        if let Some(link) = dataset.links.get_mut(row_id) {
            for coord in link.geometry.0.iter_mut() {
                if coord.x == from.x() && coord.y == from.y() {
                    *coord = to.0;
                }
            }
        }
    }
}
