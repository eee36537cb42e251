//! Configuration for netsync runs.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (netsync.toml)
//! ```toml
//! [identifiers]
//! link_id_type = "integer"
//! node_id_type = "text"
//! text_length = 8
//!
//! [pipeline]
//! link_filter = "status <> 'retired'"
//! seed_from_nodes = true
//!
//! [overlay]
//! default_value = "unknown"
//! ```

mod defaults;

pub use defaults::*;

use crate::error::NetsyncError;
use crate::filter::RowFilter;
use crate::idgen::{FieldType, IdGenerator};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetsyncConfig {
    /// Identifier field types and generation
    pub identifiers: IdentifierConfig,
    /// Field names used in audit lines
    pub fields: FieldNames,
    /// Pipeline switches
    pub pipeline: PipelineConfig,
    /// Dominant-overlay settings
    pub overlay: OverlayConfig,
}

impl NetsyncConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(NetsyncConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment = figment.merge(Serialized::defaults(overrides));

        figment.extract().map_err(ConfigError::from)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    /// Parsed link filter, if one is configured.
    pub fn link_filter(&self) -> Result<Option<RowFilter>, NetsyncError> {
        self.pipeline
            .link_filter
            .as_deref()
            .filter(|expression| !expression.trim().is_empty())
            .map(RowFilter::parse)
            .transpose()
    }

    pub fn link_id_generator(&self) -> Result<IdGenerator, NetsyncError> {
        IdGenerator::new(
            &self.fields.link_id,
            self.identifiers.link_id_type,
            self.identifiers.text_length,
            self.identifiers.seed,
        )
    }

    pub fn node_id_generator(&self) -> Result<IdGenerator, NetsyncError> {
        IdGenerator::new(
            &self.fields.node_id,
            self.identifiers.node_id_type,
            self.identifiers.text_length,
            // Distinct stream from the link generator when seeded.
            self.identifiers.seed.map(|seed| seed.wrapping_add(1)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    pub link_id_type: FieldType,
    pub node_id_type: FieldType,
    /// Length of generated text identifiers
    pub text_length: usize,
    /// Seed for reproducible text/uuid draws
    pub seed: Option<u64>,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            link_id_type: FieldType::Integer,
            node_id_type: FieldType::Integer,
            text_length: DEFAULT_TEXT_ID_LENGTH,
            seed: None,
        }
    }
}

/// Field names as they appear in audit lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub row_id: String,
    pub link_id: String,
    pub from_node: String,
    pub to_node: String,
    pub node_id: String,
    pub zone_id: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            row_id: DEFAULT_ROW_ID_FIELD.to_string(),
            link_id: DEFAULT_LINK_ID_FIELD.to_string(),
            from_node: DEFAULT_FROM_NODE_FIELD.to_string(),
            to_node: DEFAULT_TO_NODE_FIELD.to_string(),
            node_id: DEFAULT_NODE_ID_FIELD.to_string(),
            zone_id: DEFAULT_ZONE_ID_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// SQL-style filter restricting which links define nodes
    pub link_filter: Option<String>,
    /// Let prior node records fill coordinates no endpoint names
    pub seed_from_nodes: bool,
    /// Stop the run if any link lacks per-vertex elevation
    pub require_elevation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Value used when no overlay feature overlaps a link
    pub default_value: Option<String>,
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<IdentifierOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_elevation: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetsyncConfig::default();
        assert_eq!(config.identifiers.node_id_type, FieldType::Integer);
        assert_eq!(config.identifiers.text_length, DEFAULT_TEXT_ID_LENGTH);
        assert_eq!(config.fields.from_node, "fnode");
        assert!(config.link_filter().unwrap().is_none());
    }

    #[test]
    fn test_file_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netsync.toml");
        std::fs::write(
            &path,
            r#"
[identifiers]
node_id_type = "text"
text_length = 6

[pipeline]
link_filter = "mode = 'walk'"
require_elevation = false

[fields]
from_node = "a_node"
"#,
        )
        .unwrap();

        let overrides = ConfigOverrides {
            pipeline: Some(PipelineOverrides {
                require_elevation: Some(true),
                ..Default::default()
            }),
            identifiers: None,
        };
        let config = NetsyncConfig::load(Some(&path), overrides).unwrap();
        assert_eq!(config.identifiers.node_id_type, FieldType::Text);
        assert_eq!(config.identifiers.text_length, 6);
        assert_eq!(config.fields.from_node, "a_node");
        assert_eq!(config.fields.to_node, "tnode");
        assert!(config.pipeline.require_elevation);
        assert!(config.link_filter().unwrap().is_some());
    }

    #[test]
    fn test_field_type_serde() {
        let json = serde_json::to_string(&FieldType::Uuid).unwrap();
        assert_eq!(json, "\"uuid\"");

        let parsed: FieldType = serde_json::from_str("\"double\"").unwrap();
        assert_eq!(parsed, FieldType::Double);
    }

    #[test]
    fn test_unsupported_generator_type() {
        let mut config = NetsyncConfig::default();
        config.identifiers.node_id_type = FieldType::Date;
        assert!(matches!(
            config.node_id_generator(),
            Err(NetsyncError::UnsupportedIdentifierType { .. })
        ));
    }
}
