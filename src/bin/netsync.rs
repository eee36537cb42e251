use anyhow::{Context, Result};
use netsync_rs::config::{ConfigOverrides, PipelineOverrides};
use netsync_rs::{Dataset, Netsync, NetsyncConfig};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn usage() -> ! {
    eprintln!(
        "usage: netsync --dataset <json> [--config <toml>] [--out <json>] \
         [--filter <expr>] [--require-elevation] [--dry-run] [--check]"
    );
    std::process::exit(2);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(dataset_path) = parse_arg("--dataset").map(PathBuf::from) else {
        usage();
    };
    let config_path = parse_arg("--config").map(PathBuf::from);
    let out_path = parse_arg("--out").map(PathBuf::from);
    let dry_run = has_flag("--dry-run");

    let overrides = ConfigOverrides {
        pipeline: Some(PipelineOverrides {
            link_filter: parse_arg("--filter"),
            require_elevation: has_flag("--require-elevation").then_some(true),
        }),
        identifiers: None,
    };
    let config = NetsyncConfig::load(config_path.as_deref(), overrides)
        .context("loading configuration")?;
    let netsync = Netsync::new(config);

    let mut dataset = Dataset::load(&dataset_path)?;
    info!(
        "Loaded {} links, {} nodes, {} zones from {}",
        dataset.links.len(),
        dataset.nodes.len(),
        dataset.zones.len(),
        dataset_path.display()
    );

    if has_flag("--check") {
        let check = netsync.check(&dataset)?;
        for coordinate in &check.missing {
            warn!("No node id at {}", coordinate);
        }
        for (node_id, coordinates) in &check.duplicates {
            warn!("Node id {} shared by {} coordinates", node_id, coordinates.len());
        }
        if !check.is_clean() {
            std::process::exit(1);
        }
        info!("Node identity is clean");
        return Ok(());
    }

    // Audit lines are logged by the engine as they are written.
    let summary = netsync.run(&mut dataset)?;
    for (zone_id, warning) in &summary.connector_warnings {
        warn!("zone {}: {}", zone_id, warning);
    }
    info!(
        "Inserted {}, changed {}, deleted {}",
        summary.inserted(),
        summary.changed(),
        summary.deleted()
    );

    if dry_run {
        info!("Dry run; dataset not written");
        return Ok(());
    }
    let target = out_path.unwrap_or(dataset_path);
    dataset.save(&target)?;
    info!("Wrote {}", target.display());
    Ok(())
}
