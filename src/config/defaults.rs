//! Default constants for netsync configuration.
//!
//! All magic numbers are centralized here with documentation.

// =============================================================================
// Identifier Defaults
// =============================================================================

/// Length of generated text identifiers.
/// 62^10 values keeps rejection draws negligible for any realistic network.
pub const DEFAULT_TEXT_ID_LENGTH: usize = 10;

// =============================================================================
// Field Name Defaults
// =============================================================================

/// Storage row handle, as named in audit lines for link repair.
pub const DEFAULT_ROW_ID_FIELD: &str = "OBJECTID";

pub const DEFAULT_LINK_ID_FIELD: &str = "link_id";

/// Node at the first vertex of a link
pub const DEFAULT_FROM_NODE_FIELD: &str = "fnode";

/// Node at the last vertex of a link
pub const DEFAULT_TO_NODE_FIELD: &str = "tnode";

pub const DEFAULT_NODE_ID_FIELD: &str = "node_id";

pub const DEFAULT_ZONE_ID_FIELD: &str = "zone_id";

// =============================================================================
// Geometry Defaults
// =============================================================================

/// Offset (in map units, both axes) of the midpoint inserted into a
/// connector whose endpoints coincide.
pub const JITTER_OFFSET: f64 = 1.0;

// =============================================================================
// Environment
// =============================================================================

/// Prefix for environment overrides, e.g. `NETSYNC_IDENTIFIERS__SEED=7`.
pub const ENV_PREFIX: &str = "NETSYNC_";
