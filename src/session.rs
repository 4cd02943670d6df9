//! Host-side session driver.
//!
//! Threads one [`EngineState`] through the pure engine functions, owns the
//! seeded RNG for pair selection, keeps previous states for undo, and
//! optionally writes a trace row per recorded choice.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::axes::{extract_axes_with, AxisLookup, MissingAxisPolicy, TasteAxes};
use crate::planner::{select_pair_with, PairProposal, PairingMode, SelectionStrategy};
use crate::rating_engine::{
    is_complete, k_factor, record_outcome_with, Candidate, Config, EngineState,
};
use crate::signals::{extract_signals, PreferenceSignal};
use crate::trace::{
    now_epoch_ms, ComparisonTrace, SessionHeader, TraceError, TraceRecord, TraceSink,
};

// =============================================================================
// Config
// =============================================================================

fn default_total_rounds() -> usize {
    12
}

fn default_min_rounds() -> usize {
    8
}

/// Per-session settings supplied by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Round budget. Drives K decay.
    #[serde(default = "default_total_rounds")]
    pub total_rounds: usize,
    /// Rounds after which the session counts as complete.
    #[serde(default = "default_min_rounds")]
    pub min_rounds: usize,
    /// Seed for tie-breaking. Falls back to the engine config seed.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    /// Overrides metadata-based mode detection.
    #[serde(default)]
    pub pairing_mode: Option<PairingMode>,
    #[serde(default)]
    pub missing_axis_policy: MissingAxisPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_rounds: default_total_rounds(),
            min_rounds: default_min_rounds(),
            rng_seed: None,
            pairing_mode: None,
            missing_axis_policy: MissingAxisPolicy::default(),
        }
    }
}

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStopReason {
    /// `round >= min_rounds`.
    MinRoundsMet,
    /// `round >= total_rounds`.
    BudgetExhausted,
    /// The planner had no unshown pair left.
    NoPairs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Applied { round: usize },
    /// Unknown or identical ids; the state did not change.
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("round budget of {total_rounds} already used")]
    BudgetExhausted { total_rounds: usize },
    #[error("trace error: {0}")]
    Trace(#[from] TraceError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub id: String,
    pub cluster: String,
    pub rating: f64,
    pub comparisons: u32,
}

/// Everything the host persists once a session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub signals: Vec<PreferenceSignal>,
    pub axes: TasteAxes,
    pub ranking: Vec<RankedCandidate>,
    pub rounds: usize,
    pub stop_reason: Option<SessionStopReason>,
}

// =============================================================================
// Session
// =============================================================================

pub struct Session {
    cfg: SessionConfig,
    engine_cfg: Config,
    state: EngineState,
    undo_stack: Vec<EngineState>,
    rng: StdRng,
    seed: u64,
    trace: Option<Arc<dyn TraceSink>>,
    header_traced: bool,
    last_proposal: Option<(String, String, SelectionStrategy)>,
    exhausted: bool,
}

impl Session {
    pub fn new(candidates: Vec<Candidate>, cfg: SessionConfig) -> Self {
        Self::with_engine_config(candidates, cfg, Config::default())
    }

    pub fn with_engine_config(
        candidates: Vec<Candidate>,
        cfg: SessionConfig,
        engine_cfg: Config,
    ) -> Self {
        let mode = cfg
            .pairing_mode
            .unwrap_or_else(|| PairingMode::detect(&candidates));
        let seed = cfg.rng_seed.unwrap_or(engine_cfg.rng_seed);
        let state = EngineState::new(candidates, mode, &engine_cfg);
        tracing::debug!(
            items = state.items.len(),
            mode = ?mode,
            total_rounds = cfg.total_rounds,
            min_rounds = cfg.min_rounds,
            "Session started"
        );
        Self {
            cfg,
            engine_cfg,
            state,
            undo_stack: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            seed,
            trace: None,
            header_traced: false,
            last_proposal: None,
            exhausted: false,
        }
    }

    pub fn with_trace(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    /// Next pair to show, or `None` once every pair has been shown.
    pub fn next_pair(&mut self) -> Option<PairProposal> {
        let proposal = select_pair_with(
            &self.state,
            self.cfg.total_rounds,
            &self.engine_cfg,
            &mut self.rng,
        );
        match &proposal {
            Some(p) => {
                self.last_proposal =
                    Some((p.a.id().to_string(), p.b.id().to_string(), p.strategy));
            }
            None => {
                self.last_proposal = None;
                self.exhausted = true;
            }
        }
        proposal
    }

    /// Record the user's choice.
    ///
    /// The first applied choice on a traced session also writes the
    /// session header row.
    pub fn record(
        &mut self,
        winner_id: &str,
        loser_id: &str,
    ) -> Result<RecordOutcome, SessionError> {
        if self.state.round >= self.cfg.total_rounds {
            return Err(SessionError::BudgetExhausted {
                total_rounds: self.cfg.total_rounds,
            });
        }

        let next = record_outcome_with(
            &self.state,
            winner_id,
            loser_id,
            self.cfg.total_rounds,
            &self.engine_cfg,
        );
        if next.round == self.state.round {
            return Ok(RecordOutcome::Ignored);
        }

        if let Some(trace) = &self.trace {
            if !self.header_traced {
                trace.record(TraceRecord::Session(self.header()))?;
                self.header_traced = true;
            }
            let row = self.build_trace(&next, winner_id, loser_id);
            trace.record(TraceRecord::Comparison(row))?;
        }

        let previous = std::mem::replace(&mut self.state, next);
        self.undo_stack.push(previous);
        self.last_proposal = None;
        Ok(RecordOutcome::Applied {
            round: self.state.round,
        })
    }

    /// Restore the state before the last recorded choice.
    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(previous) => {
                tracing::debug!(round = previous.round, "Undid last choice");
                self.state = previous;
                self.exhausted = false;
                self.last_proposal = None;
                true
            }
            None => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        is_complete(&self.state, self.cfg.min_rounds)
    }

    pub fn stop_reason(&self) -> Option<SessionStopReason> {
        if self.exhausted {
            Some(SessionStopReason::NoPairs)
        } else if self.state.round >= self.cfg.total_rounds {
            Some(SessionStopReason::BudgetExhausted)
        } else if self.is_complete() {
            Some(SessionStopReason::MinRoundsMet)
        } else {
            None
        }
    }

    /// Run both extractors on the current state.
    pub fn finish(&self, axis_lookup: &AxisLookup) -> SessionOutcome {
        let ranking = self
            .state
            .ranking()
            .into_iter()
            .map(|it| RankedCandidate {
                id: it.id().to_string(),
                cluster: it.cluster().to_string(),
                rating: it.rating,
                comparisons: it.comparisons,
            })
            .collect();

        SessionOutcome {
            signals: extract_signals(&self.state),
            axes: extract_axes_with(&self.state, axis_lookup, self.cfg.missing_axis_policy),
            ranking,
            rounds: self.state.round,
            stop_reason: self.stop_reason(),
        }
    }

    fn header(&self) -> SessionHeader {
        // Undo never reorders items, so the live order is the starting order.
        SessionHeader {
            timestamp_ms: now_epoch_ms(),
            rng_seed: self.seed,
            total_rounds: self.cfg.total_rounds,
            min_rounds: self.cfg.min_rounds,
            mode: self.state.mode,
            candidate_ids: self.state.items.iter().map(|it| it.id().to_string()).collect(),
        }
    }

    fn build_trace(
        &self,
        next: &EngineState,
        winner_id: &str,
        loser_id: &str,
    ) -> ComparisonTrace {
        let rating =
            |state: &EngineState, id: &str| state.item(id).map(|it| it.rating).unwrap_or(0.0);
        let cluster = |id: &str| {
            self.state
                .item(id)
                .map(|it| it.cluster().to_string())
                .unwrap_or_default()
        };
        let strategy = self.last_proposal.as_ref().and_then(|(a, b, strategy)| {
            let matches = (a == winner_id && b == loser_id) || (a == loser_id && b == winner_id);
            matches.then_some(*strategy)
        });

        ComparisonTrace {
            timestamp_ms: now_epoch_ms(),
            round: self.state.round,
            total_rounds: self.cfg.total_rounds,
            winner_id: winner_id.to_string(),
            loser_id: loser_id.to_string(),
            winner_cluster: cluster(winner_id),
            loser_cluster: cluster(loser_id),
            winner_rating_before: rating(&self.state, winner_id),
            loser_rating_before: rating(&self.state, loser_id),
            winner_rating_after: rating(next, winner_id),
            loser_rating_after: rating(next, loser_id),
            k_factor: k_factor(self.state.round, self.cfg.total_rounds, &self.engine_cfg),
            strategy,
        }
    }
}
