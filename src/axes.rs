//! Continuous taste axes.
//!
//! Six fixed dimensions describe where a candidate (and, by aggregation, a
//! user) sits in taste space. Each is a scalar nominally in `[0, 1]`.
//!
//! - **volume**: quiet and sparse (0) to loud and dense (1)
//! - **temperature**: cool palettes and distance (0) to warm and intimate (1)
//! - **time**: archival and nostalgic (0) to contemporary and forward (1)
//! - **formality**: casual and hand-made (0) to structured and polished (1)
//! - **culture**: niche and local (0) to mainstream and global (1)
//! - **mood**: calm and serious (0) to energetic and playful (1)
//!
//! Candidates carry precomputed coordinates through a side lookup
//! ([`AxisLookup`]); nothing is stored on the comparison items.
//!
//! ## Aggregation
//!
//! Shown items get softmax weights `exp((rating - max_rating) / 100)`,
//! normalized to sum to one, and the user's axes are the weighted sum of
//! their coordinates. When nothing was shown the result is neutral (0.5).
//!
//! Items missing from the lookup are governed by [`MissingAxisPolicy`]. The
//! default ([`MissingAxisPolicy::Dilute`]) keeps their weight in the
//! normalization and contributes zero, which pulls every axis towards 0.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::rating_engine::EngineState;

/// Softmax temperature applied to rating gaps.
pub const RATING_SCALE: f64 = 100.0;
/// Value of every axis in the neutral vector.
pub const NEUTRAL_VALUE: f64 = 0.5;

// =============================================================================
// Axis definitions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TasteAxis {
    Volume,
    Temperature,
    Time,
    Formality,
    Culture,
    Mood,
}

impl TasteAxis {
    pub const ALL: [TasteAxis; 6] = [
        TasteAxis::Volume,
        TasteAxis::Temperature,
        TasteAxis::Time,
        TasteAxis::Formality,
        TasteAxis::Culture,
        TasteAxis::Mood,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TasteAxis::Volume => "volume",
            TasteAxis::Temperature => "temperature",
            TasteAxis::Time => "time",
            TasteAxis::Formality => "formality",
            TasteAxis::Culture => "culture",
            TasteAxis::Mood => "mood",
        }
    }

    /// What the low and high ends of the axis mean.
    pub fn poles(self) -> (&'static str, &'static str) {
        match self {
            TasteAxis::Volume => ("quiet, sparse", "loud, dense"),
            TasteAxis::Temperature => ("cool, distant", "warm, intimate"),
            TasteAxis::Time => ("archival, nostalgic", "contemporary, forward"),
            TasteAxis::Formality => ("casual, hand-made", "structured, polished"),
            TasteAxis::Culture => ("niche, local", "mainstream, global"),
            TasteAxis::Mood => ("calm, serious", "energetic, playful"),
        }
    }
}

// =============================================================================
// Axis vector
// =============================================================================

/// A point in the six-axis taste space.
///
/// Used both for per-candidate coordinates and for the aggregated result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TasteAxes {
    pub volume: f64,
    pub temperature: f64,
    pub time: f64,
    pub formality: f64,
    pub culture: f64,
    pub mood: f64,
}

impl Default for TasteAxes {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl TasteAxes {
    pub const NEUTRAL: TasteAxes = TasteAxes::splat(NEUTRAL_VALUE);
    pub const ZERO: TasteAxes = TasteAxes::splat(0.0);

    pub const fn splat(v: f64) -> Self {
        Self {
            volume: v,
            temperature: v,
            time: v,
            formality: v,
            culture: v,
            mood: v,
        }
    }

    pub fn from_array(values: [f64; 6]) -> Self {
        let [volume, temperature, time, formality, culture, mood] = values;
        Self {
            volume,
            temperature,
            time,
            formality,
            culture,
            mood,
        }
    }

    pub fn to_array(self) -> [f64; 6] {
        [
            self.volume,
            self.temperature,
            self.time,
            self.formality,
            self.culture,
            self.mood,
        ]
    }

    pub fn get(&self, axis: TasteAxis) -> f64 {
        match axis {
            TasteAxis::Volume => self.volume,
            TasteAxis::Temperature => self.temperature,
            TasteAxis::Time => self.time,
            TasteAxis::Formality => self.formality,
            TasteAxis::Culture => self.culture,
            TasteAxis::Mood => self.mood,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    fn add_scaled(&mut self, other: &TasteAxes, weight: f64) {
        let mut acc = self.to_array();
        for (a, o) in acc.iter_mut().zip(other.to_array()) {
            *a += weight * o;
        }
        *self = TasteAxes::from_array(acc);
    }
}

/// Candidate id -> precomputed coordinates.
pub type AxisLookup = HashMap<String, TasteAxes>;

/// What to do with a shown item that has no coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingAxisPolicy {
    /// Keep the item's weight in the normalization; it contributes zero.
    #[default]
    Dilute,
    /// Drop the item before normalizing. Neutral if no shown item has coordinates.
    Renormalize,
}

// =============================================================================
// Extraction
// =============================================================================

/// Weighted blend of shown items' coordinates, using [`MissingAxisPolicy::Dilute`].
pub fn extract_axes(state: &EngineState, lookup: &AxisLookup) -> TasteAxes {
    extract_axes_with(state, lookup, MissingAxisPolicy::Dilute)
}

pub fn extract_axes_with(
    state: &EngineState,
    lookup: &AxisLookup,
    policy: MissingAxisPolicy,
) -> TasteAxes {
    let shown: Vec<(f64, Option<&TasteAxes>)> = state
        .shown_items()
        .map(|it| (it.rating, lookup.get(it.id())))
        .filter(|(_, coords)| policy == MissingAxisPolicy::Dilute || coords.is_some())
        .collect();

    if shown.is_empty() {
        return TasteAxes::NEUTRAL;
    }

    let max_rating = shown
        .iter()
        .map(|(r, _)| *r)
        .fold(f64::NEG_INFINITY, f64::max);
    let raw: Vec<f64> = shown
        .iter()
        .map(|(r, _)| ((r - max_rating) / RATING_SCALE).exp())
        .collect();
    // The max-rated item contributes exp(0) = 1, so the sum is >= 1.
    let total: f64 = raw.iter().sum();

    let mut out = TasteAxes::ZERO;
    for ((_, coords), w) in shown.iter().zip(raw) {
        if let Some(coords) = coords {
            out.add_scaled(coords, w / total);
        }
    }
    out
}
