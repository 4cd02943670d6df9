//! Pair selection: which two candidates to show next.
//!
//! Two strategies, fixed per session by [`PairingMode`]:
//!
//! - **Dimension-paired**: every explicit counterpart pair ("natural" pair) is
//!   shown once, least-compared first. After that, cross pairs are scored for
//!   closeness in rating, low coverage, and cluster contrast.
//! - **Cluster-distance**: three phases keyed on the absolute round number.
//!   Cross-cluster opposition first, then close competitors, then coverage.
//!
//! A pair already present in history (either order) is never proposed again.
//! The final pick is uniform among the best `top_n` scored pairs; the RNG is
//! always supplied by the caller so runs are reproducible.

use std::cmp::Ordering;
use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clusters::cluster_distance;
use crate::rating_engine::{Config, EngineState, RatedItem};

pub use crate::rating_engine::PairingMode;

/// Which rule produced a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Dimension-paired mode, explicit counterpart pair.
    NaturalPair,
    /// Dimension-paired mode, refinement after natural pairs ran out.
    CrossPair,
    /// Cluster-distance phase A.
    CrossCluster,
    /// Cluster-distance phase B.
    Refine,
    /// Cluster-distance phase C.
    Coverage,
}

impl SelectionStrategy {
    /// Cluster-distance phase for a given round.
    pub fn phase_for_round(round: usize, cfg: &Config) -> Self {
        if round < cfg.phase_a_rounds {
            SelectionStrategy::CrossCluster
        } else if round < cfg.phase_b_rounds {
            SelectionStrategy::Refine
        } else {
            SelectionStrategy::Coverage
        }
    }
}

/// The two items to show next.
#[derive(Debug, Clone, Serialize)]
pub struct PairProposal {
    pub a: RatedItem,
    pub b: RatedItem,
    pub score: f64,
    pub strategy: SelectionStrategy,
}

impl PairProposal {
    pub fn ids(&self) -> (&str, &str) {
        (self.a.id(), self.b.id())
    }

    pub fn is_cross_cluster(&self) -> bool {
        self.a.cluster() != self.b.cluster()
    }
}

type ScoredPair = (f64, usize, usize);

/// Select the next pair with the default [`Config`].
pub fn select_pair<R: Rng + ?Sized>(
    state: &EngineState,
    total_rounds: usize,
    rng: &mut R,
) -> Option<PairProposal> {
    select_pair_with(state, total_rounds, &Config::default(), rng)
}

/// Select the next pair, or `None` when fewer than two items exist or every
/// unordered pair was already shown.
///
/// Cluster-distance phases use absolute round thresholds from `cfg`;
/// `total_rounds` does not move them.
pub fn select_pair_with<R: Rng + ?Sized>(
    state: &EngineState,
    total_rounds: usize,
    cfg: &Config,
    rng: &mut R,
) -> Option<PairProposal> {
    if state.items.len() < 2 {
        return None;
    }

    let candidates = unshown_pairs(state);
    if candidates.is_empty() {
        tracing::debug!(round = state.round, "All pairs exhausted");
        return None;
    }

    let proposal = match state.mode {
        PairingMode::DimensionPaired => select_dimension_paired(state, &candidates, cfg, rng),
        PairingMode::ClusterDistance => select_cluster_distance(state, &candidates, cfg, rng),
    }?;

    tracing::debug!(
        round = state.round,
        total_rounds,
        a = %proposal.a.id(),
        b = %proposal.b.id(),
        strategy = ?proposal.strategy,
        score = proposal.score,
        remaining = candidates.len(),
        "Selected pair"
    );
    Some(proposal)
}

/// Index pairs `(i, j)`, `i < j`, whose ids never met in history.
fn unshown_pairs(state: &EngineState) -> Vec<(usize, usize)> {
    let shown: HashSet<(&str, &str)> = state
        .history
        .iter()
        .map(|r| ordered(r.winner_id.as_str(), r.loser_id.as_str()))
        .collect();

    let n = state.items.len();
    let mut pairs = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let a = state.items[i].id();
            let b = state.items[j].id();
            if a == b || shown.contains(&ordered(a, b)) {
                continue;
            }
            pairs.push((i, j));
        }
    }
    pairs
}

fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn comparisons_of(a: &RatedItem, b: &RatedItem) -> f64 {
    f64::from(a.comparisons) + f64::from(b.comparisons)
}

fn is_natural_pair(a: &RatedItem, b: &RatedItem) -> bool {
    a.candidate.paired_with_id() == Some(b.id()) || b.candidate.paired_with_id() == Some(a.id())
}

// ---------------------------------------------------------------------
//  Dimension-paired
// ---------------------------------------------------------------------

fn select_dimension_paired<R: Rng + ?Sized>(
    state: &EngineState,
    candidates: &[(usize, usize)],
    cfg: &Config,
    rng: &mut R,
) -> Option<PairProposal> {
    let (natural, cross): (Vec<(usize, usize)>, Vec<(usize, usize)>) = candidates
        .iter()
        .copied()
        .partition(|&(i, j)| is_natural_pair(&state.items[i], &state.items[j]));

    if !natural.is_empty() {
        // Least-covered dimension first; jitter breaks ties only.
        let mut best: Option<ScoredPair> = None;
        for (i, j) in natural {
            let jitter = rng.gen::<f64>() * cfg.jitter_scale;
            let score = -comparisons_of(&state.items[i], &state.items[j]) + jitter;
            if best.map_or(true, |(s, _, _)| score > s) {
                best = Some((score, i, j));
            }
        }
        return best.map(|scored| proposal(state, scored, SelectionStrategy::NaturalPair));
    }

    if cross.is_empty() {
        return None;
    }

    let scored: Vec<ScoredPair> = cross
        .into_iter()
        .map(|(i, j)| {
            let a = &state.items[i];
            let b = &state.items[j];
            let cluster_bonus = if a.cluster() != b.cluster() { 5.0 } else { 0.0 };
            let score = -0.5 * (a.rating - b.rating).abs()
                + 30.0 / (1.0 + comparisons_of(a, b))
                + cluster_bonus;
            (score, i, j)
        })
        .collect();

    pick_among_top(scored, cfg.top_n, rng)
        .map(|scored| proposal(state, scored, SelectionStrategy::CrossPair))
}

// ---------------------------------------------------------------------
//  Cluster-distance
// ---------------------------------------------------------------------

fn select_cluster_distance<R: Rng + ?Sized>(
    state: &EngineState,
    candidates: &[(usize, usize)],
    cfg: &Config,
    rng: &mut R,
) -> Option<PairProposal> {
    let strategy = SelectionStrategy::phase_for_round(state.round, cfg);

    let scored: Vec<ScoredPair> = candidates
        .iter()
        .map(|&(i, j)| {
            let a = &state.items[i];
            let b = &state.items[j];
            let n = comparisons_of(a, b);
            let score = match strategy {
                SelectionStrategy::CrossCluster => {
                    10.0 * cluster_distance(a.cluster(), b.cluster()) + 1.0 / (1.0 + n)
                }
                SelectionStrategy::Refine => -(a.rating - b.rating).abs() + 50.0 / (1.0 + n),
                _ => -n + 2.0 * cluster_distance(a.cluster(), b.cluster()),
            };
            (score, i, j)
        })
        .collect();

    pick_among_top(scored, cfg.top_n, rng).map(|scored| proposal(state, scored, strategy))
}

// ---------------------------------------------------------------------
//  Helpers
// ---------------------------------------------------------------------

/// Stable sort by descending score, then a uniform pick among the first `top_n`.
fn pick_among_top<R: Rng + ?Sized>(
    mut scored: Vec<ScoredPair>,
    top_n: usize,
    rng: &mut R,
) -> Option<ScoredPair> {
    if scored.is_empty() {
        return None;
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    let window = top_n.clamp(1, scored.len());
    let pick = rng.gen_range(0..window);
    Some(scored[pick])
}

fn proposal(
    state: &EngineState,
    (score, i, j): ScoredPair,
    strategy: SelectionStrategy,
) -> PairProposal {
    PairProposal {
        a: state.items[i].clone(),
        b: state.items[j].clone(),
        score,
        strategy,
    }
}
