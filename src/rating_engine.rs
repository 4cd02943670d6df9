//! Comparison state, Elo updates, and the completion check.
//!
//! The engine is a set of pure functions over an explicit [`EngineState`]:
//! - [`initialize`] builds the state from a candidate pool
//! - [`record_outcome`] returns the next state after one forced choice
//! - [`is_complete`] is the round threshold check
//!
//! Pair selection lives in [`crate::planner`]; the two read-only projections
//! live in [`crate::signals`] and [`crate::axes`].
//!
//! Every transition returns a new state. The previous value stays valid, so
//! callers can keep it around for undo or replay.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key that links a candidate to its counterpart along one dimension.
pub const PAIRED_WITH_KEY: &str = "paired_with";

// ---------------------------------------------------------------------
//  Config
// ---------------------------------------------------------------------

/// Tuning knobs for rating updates and pair selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Rating every candidate starts from.
    pub initial_rating: f64,

    // -- K-factor schedule ---------------------------------------------------
    // K decays linearly from base_k at round 0 to min_k at the final round.

    /// K at the first round. Early answers move ratings aggressively.
    pub base_k: f64,
    /// K at the last round of the budget.
    pub min_k: f64,

    // -- Cluster-distance phases ---------------------------------------------

    /// Rounds `[0, phase_a_rounds)` maximize cluster opposition.
    pub phase_a_rounds: usize,
    /// Rounds `[phase_a_rounds, phase_b_rounds)` refine close competitors.
    /// Everything after is coverage.
    pub phase_b_rounds: usize,

    // -- Tie-breaking --------------------------------------------------------

    /// Final pick is uniform among this many best-scoring pairs.
    pub top_n: usize,
    /// Upper bound of the uniform jitter added to natural-pair scores.
    /// Must stay below 1.0 so comparison counts dominate.
    pub jitter_scale: f64,

    /// Seed used when a caller does not supply its own RNG.
    pub rng_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_rating: 1500.0,
            base_k: 40.0,
            min_k: 16.0,
            phase_a_rounds: 3,
            phase_b_rounds: 7,
            top_n: 3,
            jitter_scale: 0.1,
            rng_seed: 1337,
        }
    }
}

// ---------------------------------------------------------------------
//  Data model
// ---------------------------------------------------------------------

/// One comparable option offered to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable identifier.
    pub id: String,
    /// Categorical grouping used for diversity sampling.
    pub cluster: String,
    /// Tags that become preference signals when the candidate scores well (or badly).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Category carried onto positive signals.
    #[serde(default)]
    pub category: Option<String>,
    /// Opaque key/value bag. May carry [`PAIRED_WITH_KEY`].
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cluster: cluster.into(),
            tags: Vec::new(),
            category: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Shorthand for `with_metadata(PAIRED_WITH_KEY, other_id)`.
    pub fn paired_with(self, other_id: impl Into<String>) -> Self {
        self.with_metadata(PAIRED_WITH_KEY, serde_json::Value::String(other_id.into()))
    }

    /// The id this candidate is explicitly paired with, if any.
    pub fn paired_with_id(&self) -> Option<&str> {
        self.metadata.get(PAIRED_WITH_KEY).and_then(|v| v.as_str())
    }
}

/// A candidate plus the two engine-owned fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatedItem {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub rating: f64,
    /// Rounds this item took part in. Only ever grows, by one per round.
    pub comparisons: u32,
}

impl RatedItem {
    pub fn new(candidate: Candidate, rating: f64) -> Self {
        Self {
            candidate,
            rating,
            comparisons: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.candidate.id
    }

    pub fn cluster(&self) -> &str {
        &self.candidate.cluster
    }
}

/// Immutable log entry for one recorded choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub winner_id: String,
    pub loser_id: String,
    /// Value of `EngineState::round` when the choice was recorded.
    pub round: usize,
}

/// How the planner picks pairs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingMode {
    /// Candidates come in explicit counterpart pairs (one pair per dimension).
    DimensionPaired,
    /// Candidates are spread across clusters with a static distance table.
    #[default]
    ClusterDistance,
}

impl PairingMode {
    /// Dimension-paired when any candidate carries a paired-with reference.
    pub fn detect(candidates: &[Candidate]) -> Self {
        Self::detect_from(candidates.iter())
    }

    fn detect_from<'a>(mut candidates: impl Iterator<Item = &'a Candidate>) -> Self {
        if candidates.any(|c| c.paired_with_id().is_some()) {
            PairingMode::DimensionPaired
        } else {
            PairingMode::ClusterDistance
        }
    }
}

/// The single value threaded through every round of a session.
///
/// Invariant: `round == history.len()`.
///
/// A serialized state without `mode` gets it re-detected from item metadata
/// on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredEngineState")]
pub struct EngineState {
    /// Stable order; used for deterministic iteration only.
    pub items: Vec<RatedItem>,
    /// Append-only.
    pub history: Vec<ComparisonRecord>,
    pub round: usize,
    pub mode: PairingMode,
}

#[derive(Deserialize)]
struct StoredEngineState {
    items: Vec<RatedItem>,
    history: Vec<ComparisonRecord>,
    round: usize,
    #[serde(default)]
    mode: Option<PairingMode>,
}

impl From<StoredEngineState> for EngineState {
    fn from(stored: StoredEngineState) -> Self {
        let mode = stored.mode.unwrap_or_else(|| {
            PairingMode::detect_from(stored.items.iter().map(|it| &it.candidate))
        });
        Self {
            items: stored.items,
            history: stored.history,
            round: stored.round,
            mode,
        }
    }
}

impl EngineState {
    /// Build a fresh state with an explicit pairing mode.
    pub fn new(candidates: Vec<Candidate>, mode: PairingMode, cfg: &Config) -> Self {
        let items = candidates
            .into_iter()
            .map(|c| RatedItem::new(c, cfg.initial_rating))
            .collect();
        Self {
            items,
            history: Vec::new(),
            round: 0,
            mode,
        }
    }

    pub fn item(&self, id: &str) -> Option<&RatedItem> {
        self.items.iter().find(|it| it.id() == id)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|it| it.id() == id)
    }

    /// Whether the unordered pair has already been recorded in either order.
    pub fn was_compared(&self, a: &str, b: &str) -> bool {
        self.history.iter().any(|r| {
            (r.winner_id == a && r.loser_id == b) || (r.winner_id == b && r.loser_id == a)
        })
    }

    /// Items sorted by descending rating. Ties keep insertion order.
    pub fn ranking(&self) -> Vec<&RatedItem> {
        let mut ranked: Vec<&RatedItem> = self.items.iter().collect();
        ranked.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal));
        ranked
    }

    /// Items that took part in at least one comparison.
    pub fn shown_items(&self) -> impl Iterator<Item = &RatedItem> {
        self.items.iter().filter(|it| it.comparisons > 0)
    }

    pub fn total_rating(&self) -> f64 {
        self.items.iter().map(|it| it.rating).sum()
    }
}

// ---------------------------------------------------------------------
//  Initializer
// ---------------------------------------------------------------------

/// Build the initial state. The pairing mode is detected from metadata.
///
/// Empty and singleton pools are accepted; the planner simply reports no pair.
pub fn initialize(candidates: Vec<Candidate>) -> EngineState {
    let mode = PairingMode::detect(&candidates);
    EngineState::new(candidates, mode, &Config::default())
}

// ---------------------------------------------------------------------
//  Rating updater
// ---------------------------------------------------------------------

/// Linearly decaying K: `base_k` at round 0, `min_k` once `round >= total_rounds`.
///
/// A zero `total_rounds` budget has no schedule to decay along and yields
/// `min_k` for every round.
pub fn k_factor(round: usize, total_rounds: usize, cfg: &Config) -> f64 {
    let progress = if total_rounds == 0 {
        1.0
    } else {
        (round as f64 / total_rounds as f64).clamp(0.0, 1.0)
    };
    cfg.base_k - (cfg.base_k - cfg.min_k) * progress
}

/// Logistic Elo expectation that `rating` beats `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

/// Apply one outcome with the default [`Config`].
pub fn record_outcome(
    state: &EngineState,
    winner_id: &str,
    loser_id: &str,
    total_rounds: usize,
) -> EngineState {
    record_outcome_with(state, winner_id, loser_id, total_rounds, &Config::default())
}

/// Apply one outcome and return the next state.
///
/// Unknown ids (or a winner equal to the loser) leave the state untouched.
/// The update is zero-sum: the winner gains exactly what the loser drops.
pub fn record_outcome_with(
    state: &EngineState,
    winner_id: &str,
    loser_id: &str,
    total_rounds: usize,
    cfg: &Config,
) -> EngineState {
    let (wi, li) = match (state.index_of(winner_id), state.index_of(loser_id)) {
        (Some(wi), Some(li)) if wi != li => (wi, li),
        _ => {
            tracing::warn!(
                winner_id = %winner_id,
                loser_id = %loser_id,
                round = state.round,
                "Ignoring outcome for unknown or identical ids"
            );
            return state.clone();
        }
    };

    let k = k_factor(state.round, total_rounds, cfg);
    let winner_rating = state.items[wi].rating;
    let loser_rating = state.items[li].rating;
    let expected_win = expected_score(winner_rating, loser_rating);
    let delta = k * (1.0 - expected_win);

    let mut next = state.clone();
    next.items[wi].rating = winner_rating + delta;
    next.items[wi].comparisons += 1;
    next.items[li].rating = loser_rating - delta;
    next.items[li].comparisons += 1;
    next.history.push(ComparisonRecord {
        winner_id: winner_id.to_string(),
        loser_id: loser_id.to_string(),
        round: state.round,
    });
    next.round = state.round + 1;

    tracing::debug!(
        winner_id = %winner_id,
        loser_id = %loser_id,
        round = state.round,
        k,
        delta,
        "Recorded outcome"
    );

    next
}

// ---------------------------------------------------------------------
//  Completion
// ---------------------------------------------------------------------

pub fn is_complete(state: &EngineState, min_rounds: usize) -> bool {
    state.round >= min_rounds
}
