//! # Errors
//!
//! Failures surfaced to the caller. Every variant names the offending key so
//! the record can be located and fixed by hand.

use crate::idgen::FieldType;
use crate::model::RowId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetsyncError {
    /// The generator cannot produce identifiers for this field type.
    #[error("unsupported identifier type `{field_type}` for field `{field}`")]
    UnsupportedIdentifierType { field: String, field_type: FieldType },

    /// A link lacks elevation on at least one vertex.
    #[error("link {link} is missing a z coordinate on one or more vertices")]
    MissingZCoordinate { link: String },

    /// A zone has no counterpart in a layer that must cover every zone.
    #[error("zone {zone} has no counterpart in {layer}")]
    IncompleteCoverage { zone: String, layer: String },

    /// A link reached identity derivation without a unique identifier.
    #[error("link at row {row} has a missing or duplicate identifier; repair link identity first")]
    BrokenLinkIdentity { row: RowId },

    #[error("invalid filter `{expression}`: {reason}")]
    InvalidFilter { expression: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("table `{table}`: {message}")]
    Storage { table: String, message: String },
}
