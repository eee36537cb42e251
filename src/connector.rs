//! # Connector Synthesis
//!
//! Builds the line joining a zone's fixed anchor to its representative node.
//! Degenerate inputs never fail: a missing representative yields no geometry,
//! and a representative sitting exactly on the anchor gets a jittered
//! midpoint so the connector keeps positive length and a direction.

use crate::config::JITTER_OFFSET;
use geo::{Coord, LineString, Point};
use std::fmt;

/// Recoverable geometry problem met while building a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateGeometry {
    /// Fewer than two points were available; no line was built.
    MissingRepresentative,
    /// Anchor and representative coincide; a jittered midpoint was inserted.
    CoincidentEndpoints,
}

impl fmt::Display for DegenerateGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegenerateGeometry::MissingRepresentative => {
                f.write_str("no representative node; connector has no geometry")
            }
            DegenerateGeometry::CoincidentEndpoints => {
                f.write_str("representative node coincides with anchor; jittered midpoint inserted")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedConnector {
    pub geometry: Option<LineString<f64>>,
    pub warning: Option<DegenerateGeometry>,
}

/// Build the connector line from `anchor` to `representative`.
pub fn synthesize_connector(anchor: Point<f64>, representative: Option<Point<f64>>) -> SynthesizedConnector {
    let Some(representative) = representative else {
        return SynthesizedConnector {
            geometry: None,
            warning: Some(DegenerateGeometry::MissingRepresentative),
        };
    };

    let start: Coord<f64> = anchor.into();
    let end: Coord<f64> = representative.into();
    if start == end {
        let jitter = Coord {
            x: start.x + JITTER_OFFSET,
            y: start.y + JITTER_OFFSET,
        };
        return SynthesizedConnector {
            geometry: Some(LineString::new(vec![start, jitter, end])),
            warning: Some(DegenerateGeometry::CoincidentEndpoints),
        };
    }

    SynthesizedConnector {
        geometry: Some(LineString::new(vec![start, end])),
        warning: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, point, EuclideanLength};

    #[test]
    fn distinct_points_make_a_straight_connector() {
        let built = synthesize_connector(point!(x: 0.0, y: 0.0), Some(point!(x: 3.0, y: 4.0)));
        let line = built.geometry.unwrap();
        assert_eq!(line.0, vec![coord! { x: 0.0, y: 0.0 }, coord! { x: 3.0, y: 4.0 }]);
        assert_eq!(built.warning, None);
    }

    #[test]
    fn coincident_points_get_jittered_midpoint() {
        let built = synthesize_connector(point!(x: 5.0, y: 5.0), Some(point!(x: 5.0, y: 5.0)));
        let line = built.geometry.unwrap();
        assert_eq!(line.0.len(), 3);
        assert_eq!(line.0[1], coord! { x: 6.0, y: 6.0 });
        assert_eq!(line.lines().count(), 2);
        assert!(line.euclidean_length() > 0.0);
        assert_eq!(built.warning, Some(DegenerateGeometry::CoincidentEndpoints));
    }

    #[test]
    fn missing_representative_yields_no_geometry() {
        let built = synthesize_connector(point!(x: 5.0, y: 5.0), None);
        assert_eq!(built.geometry, None);
        assert_eq!(built.warning, Some(DegenerateGeometry::MissingRepresentative));
    }
}
