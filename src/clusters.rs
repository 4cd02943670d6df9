//! Static cluster-distance table.
//!
//! Distances were derived offline from cluster centroids in the six-axis
//! taste space and normalized to `[0, 1]`. The table is symmetric; only one
//! ordering of each pair is listed. Pairs that are not listed fall back to
//! [`DEFAULT_CLUSTER_DISTANCE`].

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Distance used for any cluster pair missing from the table.
pub const DEFAULT_CLUSTER_DISTANCE: f64 = 0.5;

/// Known aesthetic clusters.
pub const CLUSTERS: [&str; 8] = [
    "minimal",
    "maximal",
    "brutalist",
    "organic",
    "retro",
    "futurist",
    "luxe",
    "playful",
];

/// Precomputed centroid distances. `maximal/organic` and `retro/luxe` sit
/// near the middle of the space and are intentionally left to the default.
pub const CLUSTER_DISTANCES: &[(&str, &str, f64)] = &[
    ("minimal", "maximal", 1.0),
    ("minimal", "brutalist", 0.45),
    ("minimal", "organic", 0.6),
    ("minimal", "retro", 0.7),
    ("minimal", "futurist", 0.35),
    ("minimal", "luxe", 0.55),
    ("minimal", "playful", 0.85),
    ("maximal", "brutalist", 0.75),
    ("maximal", "retro", 0.4),
    ("maximal", "futurist", 0.65),
    ("maximal", "luxe", 0.3),
    ("maximal", "playful", 0.35),
    ("brutalist", "organic", 0.9),
    ("brutalist", "retro", 0.6),
    ("brutalist", "futurist", 0.5),
    ("brutalist", "luxe", 0.8),
    ("brutalist", "playful", 0.7),
    ("organic", "retro", 0.45),
    ("organic", "futurist", 0.95),
    ("organic", "luxe", 0.55),
    ("organic", "playful", 0.4),
    ("retro", "futurist", 0.9),
    ("retro", "playful", 0.3),
    ("futurist", "luxe", 0.45),
    ("futurist", "playful", 0.6),
    ("luxe", "playful", 0.75),
];

static DISTANCE_INDEX: Lazy<HashMap<(&'static str, &'static str), f64>> = Lazy::new(|| {
    CLUSTER_DISTANCES
        .iter()
        .map(|&(a, b, d)| (ordered(a, b), d))
        .collect()
});

fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// 0 for identical clusters, the table value otherwise, 0.5 when unknown.
pub fn cluster_distance(a: &str, b: &str) -> f64 {
    if a == b {
        return 0.0;
    }
    DISTANCE_INDEX
        .get(&ordered(a, b))
        .copied()
        .unwrap_or(DEFAULT_CLUSTER_DISTANCE)
}
