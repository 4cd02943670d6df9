//! Session traces as JSON lines.
//!
//! A session trace opens with a [`SessionHeader`] (seed, round budget,
//! pairing mode, candidate order) and then carries one [`ComparisonTrace`]
//! per applied choice. That is enough to rebuild the engine state with
//! [`replay`], undone choices included.
//!
//! The writing side is generic: [`JsonlWriter`] streams any serializable row
//! type to a file from a background thread.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::planner::{PairingMode, SelectionStrategy};
use crate::rating_engine::{record_outcome_with, Candidate, Config, EngineState};

// ---------------------------------------------------------------------
//  Rows
// ---------------------------------------------------------------------

/// First row of every session trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub timestamp_ms: i64,
    pub rng_seed: u64,
    pub total_rounds: usize,
    pub min_rounds: usize,
    pub mode: PairingMode,
    /// Pool order at session start.
    pub candidate_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonTrace {
    pub timestamp_ms: i64,
    /// Round the choice was applied at. Drops back after an undo.
    pub round: usize,
    pub total_rounds: usize,
    pub winner_id: String,
    pub loser_id: String,
    pub winner_cluster: String,
    pub loser_cluster: String,
    pub winner_rating_before: f64,
    pub loser_rating_before: f64,
    pub winner_rating_after: f64,
    pub loser_rating_after: f64,
    pub k_factor: f64,
    /// Rule that proposed this pair, when the pair came from the planner.
    pub strategy: Option<SelectionStrategy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceRecord {
    Session(SessionHeader),
    Comparison(ComparisonTrace),
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode trace row: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("malformed trace line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("trace writer stopped")]
    Closed,
    #[error("trace writer thread panicked")]
    WorkerPanicked,
    #[error("trace does not start with a session header")]
    MissingHeader,
    #[error("trace does not match the pool: {0}")]
    Inconsistent(String),
}

/// Destination for session trace rows.
pub trait TraceSink: Send + Sync {
    fn record(&self, row: TraceRecord) -> Result<(), TraceError>;
}

// ---------------------------------------------------------------------
//  Writer
// ---------------------------------------------------------------------

/// Background JSONL writer for rows of type `T`.
pub struct JsonlWriter<T> {
    sender: mpsc::Sender<T>,
}

impl<T> Clone for JsonlWriter<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Session trace writer.
pub type JsonlTraceSink = JsonlWriter<TraceRecord>;

/// Owns the writer thread of a [`JsonlWriter`].
pub struct WriterHandle {
    handle: JoinHandle<Result<usize, TraceError>>,
}

impl WriterHandle {
    /// Wait for the file to be flushed; returns the number of rows written.
    /// Blocks until every writer clone is dropped.
    pub fn finish(self) -> Result<usize, TraceError> {
        self.handle.join().map_err(|_| TraceError::WorkerPanicked)?
    }
}

impl<T: Serialize + Send + 'static> JsonlWriter<T> {
    /// Create (or truncate) `path` and start the writer thread.
    pub fn create(path: impl AsRef<Path>) -> Result<(Self, WriterHandle), TraceError> {
        let out = BufWriter::new(File::create(path)?);
        let (sender, receiver) = mpsc::channel::<T>();
        let handle = std::thread::spawn(move || drain_rows(out, receiver));
        Ok((Self { sender }, WriterHandle { handle }))
    }

    pub fn write(&self, row: T) -> Result<(), TraceError> {
        self.sender.send(row).map_err(|_| TraceError::Closed)
    }
}

impl TraceSink for JsonlWriter<TraceRecord> {
    fn record(&self, row: TraceRecord) -> Result<(), TraceError> {
        self.write(row)
    }
}

fn drain_rows<T: Serialize, W: Write>(
    mut out: W,
    rows: mpsc::Receiver<T>,
) -> Result<usize, TraceError> {
    let mut written = 0;
    for row in rows {
        serde_json::to_writer(&mut out, &row)?;
        out.write_all(b"\n")?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

// ---------------------------------------------------------------------
//  Reader and replay
// ---------------------------------------------------------------------

/// Read a JSONL file, skipping blank lines. Errors carry 1-based line numbers.
pub fn read_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, TraceError> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|source| TraceError::Decode {
            line: index + 1,
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Rebuild the engine state a traced session ended with.
///
/// `candidates` must be the session's pool in its original order. A row
/// whose round is below the current one follows an undo and restarts from
/// the state recorded at that round.
pub fn replay(
    candidates: Vec<Candidate>,
    rows: &[TraceRecord],
    cfg: &Config,
) -> Result<EngineState, TraceError> {
    let (header, rows) = match rows.split_first() {
        Some((TraceRecord::Session(header), rest)) => (header, rest),
        _ => return Err(TraceError::MissingHeader),
    };

    let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    if ids != header.candidate_ids {
        return Err(TraceError::Inconsistent(format!(
            "pool order {ids:?} differs from traced {:?}",
            header.candidate_ids
        )));
    }

    let mut state = EngineState::new(candidates, header.mode, cfg);
    // earlier[r] is the state at the start of round r, for r < state.round.
    let mut earlier: Vec<EngineState> = Vec::new();
    for row in rows {
        let TraceRecord::Comparison(row) = row else {
            return Err(TraceError::Inconsistent("second session header".to_string()));
        };
        if row.round > state.round {
            return Err(TraceError::Inconsistent(format!(
                "row for round {} but only {} rounds were replayed",
                row.round, state.round
            )));
        }
        if row.round < state.round {
            earlier.truncate(row.round + 1);
            if let Some(restored) = earlier.pop() {
                state = restored;
            }
        }

        let next = record_outcome_with(
            &state,
            &row.winner_id,
            &row.loser_id,
            header.total_rounds,
            cfg,
        );
        if next.round == state.round {
            return Err(TraceError::Inconsistent(format!(
                "round {}: {} vs {} is not a valid outcome",
                row.round, row.winner_id, row.loser_id
            )));
        }
        earlier.push(std::mem::replace(&mut state, next));
    }

    tracing::debug!(rows = rows.len(), rounds = state.round, "Replayed session trace");
    Ok(state)
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
