//! Discrete preference signals from the rating order.
//!
//! Shown items are ranked by rating and mapped to a normalized position
//! `p = index / (count - 1)` (0 = favourite, 1 = least liked). Each position
//! band gets a confidence curve:
//!
//! | band             | confidence               | polarity  |
//! |------------------|--------------------------|-----------|
//! | `p <= 0.25`      | `0.9 - 0.2 p`            | positive  |
//! | `0.25 < p <= .5` | `0.7 - 0.4 (p - 0.25)`   | positive  |
//! | `0.5 < p <= .75` | `0.4`                    | positive  |
//! | `p > 0.75`       | `0.6 + 0.8 (p - 0.75)`   | rejection |
//!
//! Positive signals below [`EMISSION_THRESHOLD`] are dropped; rejection
//! signals are always emitted.

use serde::{Deserialize, Serialize};

use crate::rating_engine::EngineState;

/// Prefix marking a rejected tag.
pub const REJECTION_PREFIX: &str = "anti:";
/// Category assigned to every rejection signal.
pub const REJECTION_CATEGORY: &str = "rejection";
/// Category for positive signals from candidates without one.
pub const DEFAULT_CATEGORY: &str = "style";
/// Minimum confidence for a positive signal to be emitted.
pub const EMISSION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceSignal {
    pub tag: String,
    pub category: String,
    /// In `[0, 1]`, rounded to two decimals.
    pub confidence: f64,
}

impl PreferenceSignal {
    pub fn is_rejection(&self) -> bool {
        self.category == REJECTION_CATEGORY && self.tag.starts_with(REJECTION_PREFIX)
    }

    /// Tag without the rejection marker.
    pub fn base_tag(&self) -> &str {
        self.tag.strip_prefix(REJECTION_PREFIX).unwrap_or(&self.tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Rejection,
}

/// Confidence and polarity for a normalized rank position.
pub fn band_confidence(position: f64) -> (f64, Polarity) {
    let p = position.clamp(0.0, 1.0);
    if p <= 0.25 {
        (0.9 - p * 0.2, Polarity::Positive)
    } else if p <= 0.50 {
        (0.7 - (p - 0.25) * 0.4, Polarity::Positive)
    } else if p <= 0.75 {
        (0.4, Polarity::Positive)
    } else {
        (0.6 + (p - 0.75) * 0.8, Polarity::Rejection)
    }
}

/// Project the state into tagged signals. Never-shown items emit nothing.
pub fn extract_signals(state: &EngineState) -> Vec<PreferenceSignal> {
    let ranked: Vec<_> = state
        .ranking()
        .into_iter()
        .filter(|it| it.comparisons > 0)
        .collect();

    let count = ranked.len();
    let mut signals = Vec::new();

    for (index, item) in ranked.into_iter().enumerate() {
        let position = if count <= 1 {
            0.0
        } else {
            index as f64 / (count - 1) as f64
        };
        let (confidence, polarity) = band_confidence(position);
        if polarity == Polarity::Positive && confidence < EMISSION_THRESHOLD {
            continue;
        }

        let confidence = round2(confidence);
        for tag in &item.candidate.tags {
            let signal = match polarity {
                Polarity::Positive => PreferenceSignal {
                    tag: tag.clone(),
                    category: item
                        .candidate
                        .category
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                    confidence,
                },
                Polarity::Rejection => PreferenceSignal {
                    tag: format!("{REJECTION_PREFIX}{tag}"),
                    category: REJECTION_CATEGORY.to_string(),
                    confidence,
                },
            };
            signals.push(signal);
        }
    }

    signals
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
