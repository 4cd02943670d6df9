use taste_harness::rating_engine::{initialize, record_outcome, Candidate, EngineState};
use taste_harness::signals::{
    extract_signals, PreferenceSignal, DEFAULT_CATEGORY, REJECTION_CATEGORY,
};

fn total_order_state() -> EngineState {
    let pool = vec![
        Candidate::new("a", "minimal")
            .with_tags(["clean_lines", "whitespace"])
            .with_category("layout"),
        Candidate::new("b", "organic")
            .with_tags(["earth_tones"])
            .with_category("palette"),
        Candidate::new("c", "retro").with_tags(["serif"]),
        Candidate::new("d", "maximal")
            .with_tags(["neon", "clutter"])
            .with_category("palette"),
    ];
    let mut state = initialize(pool);
    for (w, l) in [("a", "b"), ("a", "c"), ("a", "d"), ("b", "c"), ("b", "d"), ("c", "d")] {
        state = record_outcome(&state, w, l, 6);
    }
    state
}

fn find<'a>(signals: &'a [PreferenceSignal], tag: &str) -> Option<&'a PreferenceSignal> {
    signals.iter().find(|s| s.tag == tag)
}

#[test]
fn total_order_marks_top_positive_and_bottom_rejected() {
    let signals = extract_signals(&total_order_state());

    for tag in ["clean_lines", "whitespace"] {
        let s = find(&signals, tag).unwrap();
        assert_eq!(s.confidence, 0.9);
        assert_eq!(s.category, "layout");
        assert!(!s.is_rejection());
    }

    let b = find(&signals, "earth_tones").unwrap();
    assert_eq!(b.confidence, 0.67);
    assert_eq!(b.category, "palette");

    // Position 2/3 falls in the 0.4 band and is suppressed.
    assert!(signals.iter().all(|s| s.base_tag() != "serif"));

    for tag in ["neon", "clutter"] {
        let s = find(&signals, &format!("anti:{tag}")).unwrap();
        assert_eq!(s.confidence, 0.8);
        assert_eq!(s.category, REJECTION_CATEGORY);
        assert!(s.is_rejection());
        assert_eq!(s.base_tag(), tag);
    }

    assert_eq!(signals.len(), 5);
}

#[test]
fn signals_follow_rank_order() {
    let signals = extract_signals(&total_order_state());
    let tags: Vec<&str> = signals.iter().map(|s| s.tag.as_str()).collect();
    assert_eq!(
        tags,
        vec!["clean_lines", "whitespace", "earth_tones", "anti:neon", "anti:clutter"]
    );
}

#[test]
fn fresh_state_has_no_signals() {
    let state = initialize(vec![
        Candidate::new("a", "minimal").with_tags(["x"]),
        Candidate::new("b", "maximal").with_tags(["y"]),
    ]);
    assert!(extract_signals(&state).is_empty());
    assert!(extract_signals(&initialize(Vec::new())).is_empty());
}

#[test]
fn unshown_items_emit_nothing() {
    let pool = vec![
        Candidate::new("a", "minimal").with_tags(["won"]),
        Candidate::new("b", "maximal").with_tags(["lost"]),
        Candidate::new("c", "organic").with_tags(["never_seen"]),
    ];
    let state = record_outcome(&initialize(pool), "a", "b", 5);
    let signals = extract_signals(&state);

    assert!(signals.iter().all(|s| s.base_tag() != "never_seen"));
    let won = find(&signals, "won").unwrap();
    assert_eq!(won.confidence, 0.9);
    assert_eq!(won.category, DEFAULT_CATEGORY);
    let lost = find(&signals, "anti:lost").unwrap();
    assert_eq!(lost.confidence, 0.8);
}

#[test]
fn confidences_stay_in_unit_range_with_two_decimals() {
    let pool: Vec<Candidate> = (0..9)
        .map(|i| Candidate::new(format!("i{i}"), "minimal").with_tags([format!("t{i}")]))
        .collect();
    let mut state = initialize(pool);
    for i in 0..8 {
        let (w, l) = (format!("i{i}"), format!("i{}", i + 1));
        state = record_outcome(&state, &w, &l, 8);
    }
    let signals = extract_signals(&state);
    assert!(!signals.is_empty());
    for s in &signals {
        assert!((0.0..=1.0).contains(&s.confidence));
        assert!(((s.confidence * 100.0).round() - s.confidence * 100.0).abs() < 1e-9);
        if !s.is_rejection() {
            assert!(s.confidence >= 0.5);
        }
    }
}

#[test]
fn items_without_tags_contribute_no_signals() {
    let pool = vec![Candidate::new("a", "minimal"), Candidate::new("b", "maximal")];
    let state = record_outcome(&initialize(pool), "a", "b", 3);
    assert!(extract_signals(&state).is_empty());
}
