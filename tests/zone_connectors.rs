//! Zone layers and run-stopping guards through the full pipeline.

use netsync_rs::test_support::{duplicate_link_ids, generate_network};
use netsync_rs::{Dataset, FeatureTable, Identifier, Netsync, NetsyncConfig, NetsyncError, RowId};
use tempfile::tempdir;

#[test]
fn zone_without_representative_stops_before_connectors() {
    let mut network = generate_network(3, 10.0, 43);
    network
        .dataset
        .representatives
        .delete(RowId(1))
        .expect("row 1 exists");

    let err = Netsync::default()
        .run(&mut network.dataset)
        .expect_err("zone 1 is uncovered");
    match err {
        NetsyncError::IncompleteCoverage { zone, layer } => {
            assert_eq!(zone, "1");
            assert_eq!(layer, "zone_nodes");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(network.dataset.connectors.is_empty());
}

#[test]
fn removed_zone_loses_representative_and_connector() -> anyhow::Result<()> {
    let mut network = generate_network(3, 10.0, 47);
    let netsync = Netsync::default();
    netsync.run(&mut network.dataset)?;
    assert_eq!(network.dataset.connectors.len(), 4);

    network
        .dataset
        .zones
        .retain(|zone| zone.zone_id != Identifier::Int(2));
    let summary = netsync.run(&mut network.dataset)?;
    assert_eq!(summary.representatives.deleted, 1);
    assert_eq!(summary.connectors.deleted, 1);
    assert_eq!(summary.changed(), 0);
    assert_eq!(network.dataset.connectors.len(), 3);
    assert!(network
        .dataset
        .connectors
        .values()
        .all(|connector| connector.zone_id != Identifier::Int(2)));
    Ok(())
}

#[test]
fn missing_elevation_stops_the_run_when_required() {
    let mut network = generate_network(3, 10.0, 53);
    duplicate_link_ids(&mut network.dataset, 1);
    if let Some(link) = network.dataset.links.get_mut(RowId(3)) {
        link.elevations = None;
    }
    let mut config = NetsyncConfig::default();
    config.pipeline.require_elevation = true;

    let err = Netsync::new(config)
        .run(&mut network.dataset)
        .expect_err("link 3 has no elevation");
    assert!(matches!(err, NetsyncError::MissingZCoordinate { ref link } if link == "3"));
    assert_eq!(network.dataset.links.stats().total(), 0);
    assert_eq!(network.dataset.nodes.stats().total(), 0);
    assert!(network.dataset.connectors.is_empty());
}

#[test]
fn emptied_zone_layers_clear_their_connectors() -> anyhow::Result<()> {
    let mut network = generate_network(3, 10.0, 61);
    let netsync = Netsync::default();
    netsync.run(&mut network.dataset)?;
    assert_eq!(network.dataset.connectors.len(), 4);

    network.dataset.zones.clear();
    let row_ids: Vec<RowId> = network
        .dataset
        .representatives
        .iter()
        .map(|(row_id, _)| row_id)
        .collect();
    for row_id in row_ids {
        network.dataset.representatives.delete(row_id)?;
    }

    let summary = netsync.run(&mut network.dataset)?;
    assert_eq!(summary.connectors.deleted, 4);
    assert!(network.dataset.connectors.is_empty());
    assert!(network.dataset.representatives.is_empty());
    Ok(())
}

#[test]
fn saved_dataset_reloads_into_a_quiet_run() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("network.json");
    let mut network = generate_network(4, 15.0, 59);
    let netsync = Netsync::default();
    netsync.run(&mut network.dataset)?;
    network.dataset.save(&path)?;

    let mut reloaded = Dataset::load(&path)?;
    assert_eq!(reloaded.links.len(), network.dataset.links.len());
    assert_eq!(reloaded.connectors.len(), 9);
    let summary = netsync.run(&mut reloaded)?;
    assert!(summary.is_empty());
    Ok(())
}
