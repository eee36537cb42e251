//! # Dominant Overlay
//!
//! Picks, per base feature, the overlay value backed by the greatest
//! accumulated overlap length. Contributions are accumulated in value order,
//! so among equally long values the smallest one wins.

use geo::{BooleanOps, EuclideanLength, LineString, MultiLineString, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sum contributions per value and return the longest, if any.
///
/// Non-finite and non-positive lengths are not overlaps and are ignored.
pub fn resolve_dominant<V, I>(overlaps: I) -> Option<V>
where
    V: Ord,
    I: IntoIterator<Item = (V, f64)>,
{
    let mut totals: BTreeMap<V, f64> = BTreeMap::new();
    for (value, length) in overlaps {
        if length.is_finite() && length > 0.0 {
            *totals.entry(value).or_insert(0.0) += length;
        }
    }

    let mut best: Option<(V, f64)> = None;
    for (value, total) in totals {
        match &best {
            Some((_, longest)) if total <= *longest => {}
            _ => best = Some((value, total)),
        }
    }
    best.map(|(value, _)| value)
}

/// Per-key accumulator for overlap contributions.
#[derive(Debug, Clone)]
pub struct DominantOverlay<K, V> {
    contributions: BTreeMap<K, Vec<(V, f64)>>,
}

impl<K: Ord, V: Ord + Clone> DominantOverlay<K, V> {
    pub fn new() -> Self {
        Self {
            contributions: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, key: K, value: V, length: f64) {
        self.contributions
            .entry(key)
            .or_default()
            .push((value, length));
    }

    pub fn extend<I>(&mut self, key: K, overlaps: I)
    where
        I: IntoIterator<Item = (V, f64)>,
    {
        self.contributions.entry(key).or_default().extend(overlaps);
    }

    /// Dominant value for `key`; `None` when nothing overlapped it.
    pub fn resolve(&self, key: &K) -> Option<V> {
        self.contributions
            .get(key)
            .and_then(|overlaps| resolve_dominant(overlaps.iter().cloned()))
    }

    /// Dominant value for `key`, or `default` when there is none.
    pub fn resolve_or(&self, key: &K, default: V) -> V {
        self.resolve(key).unwrap_or(default)
    }

    /// Resolve every `key`, in key order.
    pub fn resolve_all<'a, I>(&self, keys: I) -> BTreeMap<K, Option<V>>
    where
        K: Clone + 'a,
        I: IntoIterator<Item = &'a K>,
    {
        keys.into_iter()
            .map(|key| (key.clone(), self.resolve(key)))
            .collect()
    }
}

impl<K: Ord, V: Ord + Clone> Default for DominantOverlay<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay polygon tagged with its candidate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayFeature<V> {
    pub value: V,
    pub polygon: Polygon<f64>,
}

/// Length of `line` falling inside each overlay polygon.
pub fn overlap_contributions<V: Clone>(
    line: &LineString<f64>,
    overlay: &[OverlayFeature<V>],
) -> Vec<(V, f64)> {
    let lines = MultiLineString::new(vec![line.clone()]);
    overlay
        .iter()
        .filter_map(|feature| {
            let clipped = feature.polygon.clip(&lines, false);
            let length = clipped.euclidean_length();
            (length > 0.0).then(|| (feature.value.clone(), length))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon};

    #[test]
    fn longest_accumulated_value_wins() {
        let dominant = resolve_dominant([("A", 10.0), ("B", 12.5)]);
        assert_eq!(dominant, Some("B"));
    }

    #[test]
    fn contributions_accumulate_per_value() {
        let dominant = resolve_dominant([("A", 6.0), ("B", 8.0), ("A", 5.0)]);
        assert_eq!(dominant, Some("A"));
    }

    #[test]
    fn ties_go_to_smallest_value() {
        assert_eq!(resolve_dominant([("Z", 4.0), ("M", 4.0)]), Some("M"));
    }

    #[test]
    fn no_contributions_yield_none() {
        assert_eq!(resolve_dominant(Vec::<(&str, f64)>::new()), None);
        assert_eq!(resolve_dominant([("A", 0.0), ("B", f64::NAN)]), None);
    }

    #[test]
    fn per_key_resolution_with_default() {
        let mut overlay = DominantOverlay::new();
        overlay.add(1, "paved".to_string(), 3.0);
        overlay.add(1, "gravel".to_string(), 7.0);
        overlay.extend(2, [("paved".to_string(), 1.0)]);

        assert_eq!(overlay.resolve(&1), Some("gravel".to_string()));
        assert_eq!(overlay.resolve(&3), None);
        assert_eq!(overlay.resolve_or(&3, "unknown".to_string()), "unknown");

        let all = overlay.resolve_all(&[1, 2, 3]);
        assert_eq!(all.len(), 3);
        assert_eq!(all[&2], Some("paved".to_string()));
        assert_eq!(all[&3], None);
    }

    #[test]
    fn clipping_measures_inside_length() {
        let line = line_string![(x: 0.0, y: 1.0), (x: 10.0, y: 1.0)];
        let overlay = vec![
            OverlayFeature {
                value: "park",
                polygon: polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 2.0), (x: 0.0, y: 2.0)],
            },
            OverlayFeature {
                value: "town",
                polygon: polygon![(x: 4.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 2.0), (x: 4.0, y: 2.0)],
            },
            OverlayFeature {
                value: "lake",
                polygon: polygon![(x: 20.0, y: 0.0), (x: 30.0, y: 0.0), (x: 30.0, y: 2.0)],
            },
        ];
        let contributions = overlap_contributions(&line, &overlay);
        assert_eq!(contributions.len(), 2);
        let park = contributions.iter().find(|(value, _)| *value == "park").unwrap().1;
        assert!((park - 4.0).abs() < 1e-9);
        assert_eq!(resolve_dominant(contributions), Some("town"));
    }
}
