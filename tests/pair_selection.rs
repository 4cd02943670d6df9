use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;

use taste_harness::clusters::cluster_distance;
use taste_harness::planner::{select_pair, select_pair_with, SelectionStrategy};
use taste_harness::rating_engine::{
    initialize, record_outcome, Candidate, ComparisonRecord, Config, EngineState, PairingMode,
    RatedItem,
};

fn clustered_pool() -> Vec<Candidate> {
    let clusters = ["minimal", "maximal", "organic", "futurist"];
    (0..8)
        .map(|i| Candidate::new(format!("item{i}"), clusters[i / 2]))
        .collect()
}

fn paired_pool() -> Vec<Candidate> {
    vec![
        Candidate::new("loud", "maximal").paired_with("quiet"),
        Candidate::new("quiet", "minimal").paired_with("loud"),
        Candidate::new("warm", "organic").paired_with("cool"),
        Candidate::new("cool", "futurist").paired_with("warm"),
        Candidate::new("old", "retro").paired_with("new"),
        Candidate::new("new", "futurist").paired_with("old"),
    ]
}

fn key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Select and record (first item wins) until the planner gives up.
fn drain(
    mut state: EngineState,
    total_rounds: usize,
    seed: u64,
) -> (EngineState, Vec<(String, String, SelectionStrategy)>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picks = Vec::new();
    while let Some(p) = select_pair(&state, total_rounds, &mut rng) {
        let (a, b) = (p.a.id().to_string(), p.b.id().to_string());
        state = record_outcome(&state, &a, &b, total_rounds);
        picks.push((a, b, p.strategy));
    }
    (state, picks)
}

#[test]
fn fewer_than_two_items_yields_no_pair() {
    let mut rng = StdRng::seed_from_u64(1);
    assert!(select_pair(&initialize(Vec::new()), 10, &mut rng).is_none());
    let solo = initialize(vec![Candidate::new("a", "minimal")]);
    assert!(select_pair(&solo, 10, &mut rng).is_none());
}

#[test]
fn cluster_mode_never_repeats_and_exhausts_all_pairs() {
    let (state, picks) = drain(initialize(clustered_pool()), 40, 7);
    let n = 8;
    assert_eq!(picks.len(), n * (n - 1) / 2);

    let unique: HashSet<(String, String)> = picks.iter().map(|(a, b, _)| key(a, b)).collect();
    assert_eq!(unique.len(), picks.len());

    let mut rng = StdRng::seed_from_u64(99);
    assert!(select_pair(&state, 40, &mut rng).is_none());
}

#[test]
fn dimension_mode_never_repeats_and_exhausts_all_pairs() {
    let (state, picks) = drain(initialize(paired_pool()), 20, 3);
    assert_eq!(picks.len(), 15);
    let unique: HashSet<(String, String)> = picks.iter().map(|(a, b, _)| key(a, b)).collect();
    assert_eq!(unique.len(), 15);

    let mut rng = StdRng::seed_from_u64(5);
    assert!(select_pair(&state, 20, &mut rng).is_none());
}

#[test]
fn pairs_recorded_outside_the_planner_are_not_proposed() {
    let mut state = initialize(vec![
        Candidate::new("a", "minimal"),
        Candidate::new("b", "maximal"),
        Candidate::new("c", "organic"),
    ]);
    // Either order counts as shown.
    state = record_outcome(&state, "b", "a", 3);
    state = record_outcome(&state, "a", "c", 3);

    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..20 {
        let p = select_pair(&state, 3, &mut rng).unwrap();
        assert_eq!(key(p.a.id(), p.b.id()), key("b", "c"));
    }

    state = record_outcome(&state, "c", "b", 3);
    assert!(select_pair(&state, 3, &mut rng).is_none());
}

#[test]
fn early_rounds_prefer_cross_cluster_pairs() {
    let state = initialize(clustered_pool());
    let trials = 300;
    let mut cross = 0;
    for seed in 0..trials {
        let mut rng = StdRng::seed_from_u64(seed);
        let p = select_pair(&state, 20, &mut rng).unwrap();
        assert_eq!(p.strategy, SelectionStrategy::CrossCluster);
        if p.is_cross_cluster() {
            cross += 1;
        }
    }
    assert!(cross as f64 / trials as f64 >= 0.9, "cross-cluster rate {cross}/{trials}");
}

#[test]
fn first_pick_comes_from_the_most_opposed_clusters() {
    let state = initialize(clustered_pool());
    // minimal/maximal is 1.0 and organic/futurist is 0.95; four pairs each.
    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let p = select_pair(&state, 20, &mut rng).unwrap();
        assert!(cluster_distance(p.a.cluster(), p.b.cluster()) >= 0.95);
    }
}

#[test]
fn cluster_phases_follow_the_round_counter() {
    let (_, picks) = drain(initialize(clustered_pool()), 40, 21);
    let cfg = Config::default();
    for (round, (_, _, strategy)) in picks.iter().enumerate() {
        assert_eq!(*strategy, SelectionStrategy::phase_for_round(round, &cfg), "round {round}");
    }
    assert_eq!(picks[0].2, SelectionStrategy::CrossCluster);
    assert_eq!(picks[3].2, SelectionStrategy::Refine);
    assert_eq!(picks[7].2, SelectionStrategy::Coverage);
}

#[test]
fn natural_pairs_are_covered_before_cross_pairs() {
    let (_, picks) = drain(initialize(paired_pool()), 20, 17);
    let natural: HashSet<(String, String)> = [("loud", "quiet"), ("warm", "cool"), ("old", "new")]
        .iter()
        .map(|(a, b)| key(a, b))
        .collect();

    for (a, b, strategy) in &picks[..3] {
        assert_eq!(*strategy, SelectionStrategy::NaturalPair);
        assert!(natural.contains(&key(a, b)), "{a}/{b} is not a natural pair");
    }
    for (a, b, strategy) in &picks[3..] {
        assert_eq!(*strategy, SelectionStrategy::CrossPair);
        assert!(!natural.contains(&key(a, b)));
    }
}

#[test]
fn one_sided_reference_still_counts_as_natural() {
    let state = initialize(vec![
        Candidate::new("a", "minimal").paired_with("b"),
        Candidate::new("b", "maximal"),
        Candidate::new("c", "organic"),
    ]);
    assert_eq!(state.mode, PairingMode::DimensionPaired);
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let p = select_pair(&state, 5, &mut rng).unwrap();
        assert_eq!(key(p.a.id(), p.b.id()), key("a", "b"));
        assert_eq!(p.strategy, SelectionStrategy::NaturalPair);
    }
}

#[test]
fn explicit_mode_overrides_metadata() {
    let cfg = Config::default();
    let state = EngineState::new(paired_pool(), PairingMode::ClusterDistance, &cfg);
    let mut rng = StdRng::seed_from_u64(2);
    let p = select_pair(&state, 10, &mut rng).unwrap();
    assert_eq!(p.strategy, SelectionStrategy::CrossCluster);
}

#[test]
fn same_seed_same_sequence() {
    let (_, first) = drain(initialize(clustered_pool()), 30, 1234);
    let (_, second) = drain(initialize(clustered_pool()), 30, 1234);
    assert_eq!(first, second);
}

// ---------------------------------------------------------------------
//  Scoring rules on hand-built states
// ---------------------------------------------------------------------

/// `(id, cluster, rating, comparisons)`
type ItemRow<'a> = (&'a str, &'a str, f64, u32);

fn hand_built(rows: &[ItemRow], mode: PairingMode, round: usize) -> EngineState {
    let candidates = rows
        .iter()
        .map(|&(id, cluster, _, _)| Candidate::new(id, cluster))
        .collect();
    let mut state = EngineState::new(candidates, mode, &Config::default());
    for (item, &(_, _, rating, comparisons)) in state.items.iter_mut().zip(rows) {
        item.rating = rating;
        item.comparisons = comparisons;
    }
    state.round = round;
    state
}

/// The `k` best unshown pairs under `score`, as ordered id keys.
fn top_pairs(
    state: &EngineState,
    k: usize,
    score: impl Fn(&RatedItem, &RatedItem) -> f64,
) -> HashSet<(String, String)> {
    let mut scored = Vec::new();
    for (i, a) in state.items.iter().enumerate() {
        for b in &state.items[i + 1..] {
            if !state.was_compared(a.id(), b.id()) {
                scored.push((score(a, b), key(a.id(), b.id())));
            }
        }
    }
    scored.sort_by(|x, y| y.0.partial_cmp(&x.0).unwrap());
    scored.into_iter().take(k).map(|(_, pair)| pair).collect()
}

fn comparisons(a: &RatedItem, b: &RatedItem) -> f64 {
    f64::from(a.comparisons + b.comparisons)
}

fn greedy() -> Config {
    Config {
        top_n: 1,
        ..Config::default()
    }
}

#[test]
fn refine_prefers_close_and_fresh_competitors() {
    // e/f are the closest pair but already heavily compared.
    let state = hand_built(
        &[
            ("a", "minimal", 1500.0, 0),
            ("b", "maximal", 1505.0, 0),
            ("c", "organic", 1600.0, 0),
            ("d", "futurist", 1800.0, 0),
            ("e", "retro", 1401.0, 10),
            ("f", "luxe", 1400.0, 10),
        ],
        PairingMode::ClusterDistance,
        4,
    );

    let mut rng = StdRng::seed_from_u64(3);
    let best = select_pair_with(&state, 12, &greedy(), &mut rng).unwrap();
    assert_eq!(best.strategy, SelectionStrategy::Refine);
    assert_eq!(key(best.a.id(), best.b.id()), key("a", "b"));

    let top = top_pairs(&state, 3, |a, b| {
        -(a.rating - b.rating).abs() + 50.0 / (1.0 + comparisons(a, b))
    });
    assert!(top.contains(&key("e", "f")));
    for seed in 0..100 {
        let mut rng = StdRng::seed_from_u64(seed);
        let p = select_pair(&state, 12, &mut rng).unwrap();
        assert!(top.contains(&key(p.a.id(), p.b.id())), "seed {seed}");
    }
}

#[test]
fn coverage_prefers_least_compared_items() {
    let state = hand_built(
        &[
            ("a", "minimal", 1560.0, 5),
            ("b", "maximal", 1440.0, 5),
            ("c", "minimal", 1500.0, 0),
            ("d", "minimal", 1500.0, 0),
            ("e", "organic", 1500.0, 2),
        ],
        PairingMode::ClusterDistance,
        8,
    );

    let mut rng = StdRng::seed_from_u64(4);
    let best = select_pair_with(&state, 12, &greedy(), &mut rng).unwrap();
    assert_eq!(best.strategy, SelectionStrategy::Coverage);
    assert_eq!(key(best.a.id(), best.b.id()), key("c", "d"));

    let top = top_pairs(&state, 3, |a, b| {
        -comparisons(a, b) + 2.0 * cluster_distance(a.cluster(), b.cluster())
    });
    for seed in 0..100 {
        let mut rng = StdRng::seed_from_u64(seed);
        let p = select_pair(&state, 12, &mut rng).unwrap();
        assert!(top.contains(&key(p.a.id(), p.b.id())), "seed {seed}");
        assert!(p.a.comparisons + p.b.comparisons <= 2);
    }
}

#[test]
fn cross_pairs_favour_close_ratings_across_clusters() {
    let mut state = hand_built(
        &[
            ("a", "minimal", 1500.0, 1),
            ("b", "maximal", 1500.0, 1),
            ("c", "minimal", 1501.0, 0),
            ("d", "organic", 1600.0, 0),
            ("e", "minimal", 1300.0, 0),
        ],
        PairingMode::DimensionPaired,
        1,
    );
    state.items[0].candidate = Candidate::new("a", "minimal").paired_with("b");
    state.items[1].candidate = Candidate::new("b", "maximal").paired_with("a");
    state.history.push(ComparisonRecord {
        winner_id: "a".to_string(),
        loser_id: "b".to_string(),
        round: 0,
    });

    // b/c beats a/c only through the cluster bonus.
    let mut rng = StdRng::seed_from_u64(5);
    let best = select_pair_with(&state, 12, &greedy(), &mut rng).unwrap();
    assert_eq!(best.strategy, SelectionStrategy::CrossPair);
    assert_eq!(key(best.a.id(), best.b.id()), key("b", "c"));

    let top = top_pairs(&state, 3, |a, b| {
        let bonus = if a.cluster() != b.cluster() { 5.0 } else { 0.0 };
        -0.5 * (a.rating - b.rating).abs() + 30.0 / (1.0 + comparisons(a, b)) + bonus
    });
    assert_eq!(top, [key("b", "c"), key("a", "c"), key("c", "d")].into_iter().collect());
    for seed in 0..100 {
        let mut rng = StdRng::seed_from_u64(seed);
        let p = select_pair(&state, 12, &mut rng).unwrap();
        assert_eq!(p.strategy, SelectionStrategy::CrossPair);
        assert!(top.contains(&key(p.a.id(), p.b.id())), "seed {seed}");
    }
}

#[test]
fn least_compared_natural_pair_goes_first() {
    let mut state = hand_built(
        &[
            ("a", "minimal", 1500.0, 3),
            ("b", "maximal", 1500.0, 3),
            ("c", "organic", 1500.0, 0),
            ("d", "futurist", 1500.0, 0),
            ("e", "retro", 1500.0, 1),
            ("f", "luxe", 1500.0, 1),
        ],
        PairingMode::DimensionPaired,
        0,
    );
    for (i, partner) in ["b", "a", "d", "c", "f", "e"].into_iter().enumerate() {
        let c = state.items[i].candidate.clone();
        state.items[i].candidate = c.paired_with(partner);
    }

    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let p = select_pair(&state, 12, &mut rng).unwrap();
        assert_eq!(p.strategy, SelectionStrategy::NaturalPair);
        assert_eq!(key(p.a.id(), p.b.id()), key("c", "d"), "seed {seed}");
    }

    state.history.push(ComparisonRecord {
        winner_id: "d".to_string(),
        loser_id: "c".to_string(),
        round: 0,
    });
    state.round = 1;
    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let p = select_pair(&state, 12, &mut rng).unwrap();
        assert_eq!(key(p.a.id(), p.b.id()), key("e", "f"), "seed {seed}");
    }
}
