//! Offline evaluation harness for the preference engine.
//!
//! Runs synthetic pools through a real [`Session`], replacing the human
//! with a simulated chooser that has a hidden utility per candidate.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::axes::{AxisLookup, TasteAxes};
use crate::clusters::CLUSTERS;
use crate::rating_engine::{Candidate, Config as EngineConfig};
use crate::session::{Session, SessionConfig, SessionStopReason};

// =============================================================================
// Synthetic case definitions
// =============================================================================

#[derive(Debug, Clone)]
pub struct SyntheticCase {
    pub name: &'static str,
    pub n_items: usize,
    /// Clusters are assigned round-robin from the static cluster list.
    pub n_clusters: usize,
    /// Link items `(2k, 2k + 1)` as explicit counterparts.
    pub dimension_pairs: bool,
    pub total_rounds: usize,
    pub min_rounds: usize,
    pub noise_sigma: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationMetrics {
    /// Final ratings vs hidden utilities, over all items.
    pub kendall_tau: f64,
    /// Share of positive signals whose candidate is in the true top half.
    pub positive_precision: f64,
    /// Share of rejection signals whose candidate is in the true bottom half.
    pub rejection_precision: f64,
    pub positive_signals: usize,
    pub rejection_signals: usize,
    /// Share of items shown at least once.
    pub coverage: f64,
    /// Share of cross-cluster pairs among the first cross-cluster-phase rounds.
    pub early_cross_cluster_rate: f64,
    pub rounds: usize,
    pub stop_reason: Option<SessionStopReason>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationResult {
    pub case_name: String,
    pub metrics: EvaluationMetrics,
    pub axes: TasteAxes,
    /// Sum of ratings after each round. Flat for a zero-sum engine.
    pub rating_mass_trajectory: Vec<f64>,
}

// =============================================================================
// Public API
// =============================================================================

pub fn synthetic_cases() -> Vec<SyntheticCase> {
    vec![
        SyntheticCase {
            name: "round_robin_4",
            n_items: 4,
            n_clusters: 4,
            dimension_pairs: false,
            total_rounds: 6,
            min_rounds: 6,
            noise_sigma: 0.0,
            seed: 42,
        },
        SyntheticCase {
            name: "round_robin_6",
            n_items: 6,
            n_clusters: 3,
            dimension_pairs: false,
            total_rounds: 15,
            min_rounds: 15,
            noise_sigma: 0.0,
            seed: 43,
        },
        SyntheticCase {
            name: "clustered_16",
            n_items: 16,
            n_clusters: 4,
            dimension_pairs: false,
            total_rounds: 24,
            min_rounds: 20,
            noise_sigma: 0.0,
            seed: 44,
        },
        SyntheticCase {
            name: "noisy_clustered_24",
            n_items: 24,
            n_clusters: 8,
            dimension_pairs: false,
            total_rounds: 30,
            min_rounds: 30,
            noise_sigma: 4.0,
            seed: 45,
        },
        SyntheticCase {
            name: "dimension_pairs_10",
            n_items: 10,
            n_clusters: 2,
            dimension_pairs: true,
            total_rounds: 15,
            min_rounds: 12,
            noise_sigma: 0.0,
            seed: 46,
        },
        SyntheticCase {
            name: "tiny_pool_3",
            n_items: 3,
            n_clusters: 2,
            dimension_pairs: false,
            total_rounds: 10,
            min_rounds: 10,
            noise_sigma: 0.0,
            seed: 47,
        },
    ]
}

/// Run every case whose name equals `filter` (all cases when `None`).
pub fn run_synthetic_suite(filter: Option<&str>) -> Vec<EvaluationResult> {
    synthetic_cases()
        .iter()
        .filter(|case| filter.map_or(true, |name| case.name == name))
        .map(run_synthetic_case)
        .collect()
}

/// Hidden utility of item `i`: strictly decreasing with the index.
pub fn synthetic_utility(i: usize, n: usize) -> f64 {
    (n - i) as f64
}

/// Deterministic pool for a case. Item ids are `c00`, `c01`, ...
pub fn synthetic_pool(case: &SyntheticCase) -> Vec<Candidate> {
    let n_clusters = case.n_clusters.clamp(1, CLUSTERS.len());
    (0..case.n_items)
        .map(|i| {
            let id = item_id(i);
            let mut c = Candidate::new(&id, CLUSTERS[i % n_clusters])
                .with_tags([format!("tag_{id}")])
                .with_category("palette");
            if case.dimension_pairs {
                let partner = if i % 2 == 0 { i + 1 } else { i - 1 };
                if partner < case.n_items {
                    c = c.paired_with(item_id(partner));
                }
            }
            c
        })
        .collect()
}

/// Coordinates where `volume` tracks the hidden utility and the other axes
/// are fixed pseudo-random values.
pub fn synthetic_axis_lookup(case: &SyntheticCase) -> AxisLookup {
    let n = case.n_items.max(1);
    (0..case.n_items)
        .map(|i| {
            let u = synthetic_utility(i, n) / n as f64;
            let p = |salt: usize| ((i * 37 + salt * 11) % 100) as f64 / 100.0;
            (
                item_id(i),
                TasteAxes::from_array([u, p(1), p(2), p(3), p(4), p(5)]),
            )
        })
        .collect()
}

pub fn run_synthetic_case(case: &SyntheticCase) -> EvaluationResult {
    let pool = synthetic_pool(case);
    let utilities: HashMap<String, f64> = (0..case.n_items)
        .map(|i| (item_id(i), synthetic_utility(i, case.n_items)))
        .collect();
    let mut chooser = SimulatedChooser::new(&utilities, case.noise_sigma, case.seed);

    let engine_cfg = EngineConfig::default();
    let phase_a_rounds = engine_cfg.phase_a_rounds;
    let session_cfg = SessionConfig {
        total_rounds: case.total_rounds,
        min_rounds: case.min_rounds,
        rng_seed: Some(case.seed.wrapping_add(1)),
        ..SessionConfig::default()
    };
    let mut session = Session::with_engine_config(pool, session_cfg, engine_cfg);

    let mut early_pairs = 0usize;
    let mut early_cross = 0usize;
    let mut rating_mass_trajectory = vec![session.state().total_rating()];

    while session.stop_reason().is_none() {
        let Some(pair) = session.next_pair() else {
            break;
        };
        if session.state().round < phase_a_rounds {
            early_pairs += 1;
            early_cross += usize::from(pair.is_cross_cluster());
        }

        let (winner, loser) = chooser.choose(pair.a.id(), pair.b.id());
        let (winner, loser) = (winner.to_string(), loser.to_string());
        if session.record(&winner, &loser).is_err() {
            break;
        }
        rating_mass_trajectory.push(session.state().total_rating());
    }

    let outcome = session.finish(&synthetic_axis_lookup(case));
    let state = session.state();

    let rank_pairs: Vec<(f64, f64)> = state
        .items
        .iter()
        .map(|it| (it.rating, utilities.get(it.id()).copied().unwrap_or(0.0)))
        .collect();

    let half = case.n_items / 2;
    let top_half: HashSet<String> = (0..half).map(item_id).collect();
    let bottom_half: HashSet<String> = (case.n_items - half..case.n_items).map(item_id).collect();

    let (rejections, positives): (Vec<_>, Vec<_>) =
        outcome.signals.iter().partition(|s| s.is_rejection());
    let signal_item = |tag: &str| tag.strip_prefix("tag_").unwrap_or(tag).to_string();
    let positive_hits = positives
        .iter()
        .filter(|s| top_half.contains(&signal_item(s.base_tag())))
        .count();
    let rejection_hits = rejections
        .iter()
        .filter(|s| bottom_half.contains(&signal_item(s.base_tag())))
        .count();

    let shown = state.shown_items().count();

    EvaluationResult {
        case_name: case.name.to_string(),
        metrics: EvaluationMetrics {
            kendall_tau: kendall_tau_b(&rank_pairs),
            positive_precision: ratio(positive_hits, positives.len()),
            rejection_precision: ratio(rejection_hits, rejections.len()),
            positive_signals: positives.len(),
            rejection_signals: rejections.len(),
            coverage: ratio(shown, case.n_items),
            early_cross_cluster_rate: ratio(early_cross, early_pairs),
            rounds: outcome.rounds,
            stop_reason: outcome.stop_reason,
        },
        axes: outcome.axes,
        rating_mass_trajectory,
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn item_id(i: usize) -> String {
    format!("c{i:02}")
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

// ---------------------------------------------------------------------
//  Simulated chooser
// ---------------------------------------------------------------------

/// Answers a pair by comparing hidden utilities perturbed with Gaussian noise.
struct SimulatedChooser<'a> {
    utilities: &'a HashMap<String, f64>,
    sigma: f64,
    rng: StdRng,
    /// Second value of the last Box-Muller pair, not yet used.
    spare: Option<f64>,
}

impl<'a> SimulatedChooser<'a> {
    fn new(utilities: &'a HashMap<String, f64>, sigma: f64, seed: u64) -> Self {
        Self {
            utilities,
            sigma,
            rng: StdRng::seed_from_u64(seed),
            spare: None,
        }
    }

    /// `(winner, loser)`. Ties go to `a`.
    fn choose<'p>(&mut self, a: &'p str, b: &'p str) -> (&'p str, &'p str) {
        let ua = self.perceived(a);
        let ub = self.perceived(b);
        if ua >= ub {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn perceived(&mut self, id: &str) -> f64 {
        let utility = self.utilities.get(id).copied().unwrap_or(0.0);
        if self.sigma <= 0.0 {
            return utility;
        }
        utility + self.sigma * self.standard_normal()
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.spare.take() {
            return z;
        }
        // Open interval keeps ln() finite.
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let theta = 2.0 * std::f64::consts::PI * self.rng.gen::<f64>();
        let r = (-2.0 * u1.ln()).sqrt();
        self.spare = Some(r * theta.sin());
        r * theta.cos()
    }
}

// ---------------------------------------------------------------------
//  Metrics
// ---------------------------------------------------------------------

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Tau-b over `(predicted, truth)` pairs. 0 when undefined.
fn kendall_tau_b(pairs: &[(f64, f64)]) -> f64 {
    // Concordant minus discordant, and the non-tied pair count on each side.
    let mut score = 0i64;
    let mut untied_predicted = 0i64;
    let mut untied_truth = 0i64;

    for (i, &(p1, t1)) in pairs.iter().enumerate() {
        for &(p2, t2) in &pairs[i + 1..] {
            let sp = sign(p1 - p2);
            let st = sign(t1 - t2);
            score += i64::from(sp * st);
            untied_predicted += i64::from(sp != 0);
            untied_truth += i64::from(st != 0);
        }
    }

    let denom = ((untied_predicted * untied_truth) as f64).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        score as f64 / denom
    }
}
