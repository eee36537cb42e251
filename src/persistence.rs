//! # Dataset Persistence
//!
//! A dataset bundles every layer one run touches. It is stored as a single
//! JSON document; saves go through a sibling temp file and a rename so a
//! failed write never leaves a truncated dataset behind.

use crate::model::{LinkRecord, NodeRecord, RepresentativeNode, ZoneConnector, ZoneRecord};
use crate::store::Table;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub const LINKS_TABLE: &str = "links";
pub const NODES_TABLE: &str = "nodes";
pub const REPRESENTATIVES_TABLE: &str = "zone_nodes";
pub const CONNECTORS_TABLE: &str = "zone_connectors";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub links: Table<LinkRecord>,
    #[serde(default = "empty_nodes")]
    pub nodes: Table<NodeRecord>,
    #[serde(default)]
    pub zones: Vec<ZoneRecord>,
    #[serde(default = "empty_representatives")]
    pub representatives: Table<RepresentativeNode>,
    #[serde(default = "empty_connectors")]
    pub connectors: Table<ZoneConnector>,
}

fn empty_nodes() -> Table<NodeRecord> {
    Table::new(NODES_TABLE)
}

fn empty_representatives() -> Table<RepresentativeNode> {
    Table::new(REPRESENTATIVES_TABLE)
}

fn empty_connectors() -> Table<ZoneConnector> {
    Table::new(CONNECTORS_TABLE)
}

impl Dataset {
    /// Dataset with only links; every derived layer starts empty.
    pub fn from_links<I>(links: I) -> Self
    where
        I: IntoIterator<Item = LinkRecord>,
    {
        Self {
            links: Table::from_rows(LINKS_TABLE, links),
            nodes: empty_nodes(),
            zones: Vec::new(),
            representatives: empty_representatives(),
            connectors: empty_connectors(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path)
            .with_context(|| format!("opening dataset {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing dataset {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let staging = path.with_extension("json.tmp");
        {
            let file = fs::File::create(&staging)
                .with_context(|| format!("creating {}", staging.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)
                .with_context(|| format!("writing dataset {}", staging.display()))?;
            writer.flush()?;
        }
        fs::rename(&staging, path)
            .with_context(|| format!("replacing dataset {}", path.display()))?;
        Ok(())
    }
}
