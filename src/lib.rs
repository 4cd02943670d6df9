#![forbid(unsafe_code)]

//! # taste-harness
//!
//! Infers a user's taste from a short run of forced binary choices
//! ("which of these two do you prefer?").
//!
//! Each choice updates Elo ratings with a K-factor that decays over the
//! session. The planner picks the next pair to maximize what a single answer
//! can teach: broad cross-cluster contrasts first, then close competitors,
//! then under-sampled items. At the end the rating order is projected into
//! confidence-weighted preference tags and a six-axis taste vector.
//!
//! All engine operations are pure functions over an explicit
//! [`EngineState`]; randomness is always injected by the caller.

pub mod axes;
pub mod clusters;
pub mod config;
pub mod evaluation;
pub mod planner;
pub mod rating_engine;
pub mod session;
pub mod signals;
pub mod trace;

pub use axes::{
    extract_axes, extract_axes_with, AxisLookup, MissingAxisPolicy, TasteAxes, TasteAxis,
};
pub use clusters::cluster_distance;
pub use config::ConfigError;
pub use planner::{select_pair, select_pair_with, PairProposal, SelectionStrategy};
pub use rating_engine::{
    initialize, is_complete, record_outcome, record_outcome_with, Candidate, ComparisonRecord,
    Config, EngineState, PairingMode, RatedItem,
};
pub use session::{
    RecordOutcome, Session, SessionConfig, SessionError, SessionOutcome, SessionStopReason,
};
pub use signals::{extract_signals, PreferenceSignal};
pub use trace::{
    replay, ComparisonTrace, JsonlTraceSink, JsonlWriter, SessionHeader, TraceError, TraceRecord,
    TraceSink, WriterHandle,
};
