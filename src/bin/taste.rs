#![forbid(unsafe_code)]

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use taste_harness::axes::{extract_axes_with, AxisLookup, MissingAxisPolicy};
use taste_harness::clusters::CLUSTER_DISTANCES;
use taste_harness::config::{load_axis_lookup, load_candidate_pool, load_session_config};
use taste_harness::evaluation::{run_synthetic_suite, EvaluationResult};
use taste_harness::rating_engine::{Config, EngineState};
use taste_harness::session::{RecordOutcome, Session, SessionConfig};
use taste_harness::signals::extract_signals;
use taste_harness::trace::{
    read_jsonl, replay, JsonlTraceSink, JsonlWriter, TraceRecord, TraceSink,
};

#[derive(Parser)]
#[command(name = "taste", version, about = "Pairwise taste preference harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run synthetic evaluation suite
    Eval {
        #[arg(long)]
        case: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run an interactive session, reading choices from stdin
    ///
    /// For each pair answer `1` or `2`; `u` undoes the last choice and `q` stops.
    Play {
        /// JSON array of candidates
        #[arg(long)]
        pool: PathBuf,
        /// Session config JSON
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON object: candidate id -> axis coordinates
        #[arg(long)]
        axes: Option<PathBuf>,
        /// Override the tie-break seed
        #[arg(long)]
        rng_seed: Option<u64>,
        /// JSONL trace output
        #[arg(long)]
        trace: Option<PathBuf>,
        /// Session outcome JSON (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Extract signals and axes from a saved engine state
    Extract {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        axes: Option<PathBuf>,
        /// Drop shown items without coordinates before normalizing
        #[arg(long)]
        renormalize: bool,
    },
    /// Rebuild the final engine state from a pool and a session trace
    Replay {
        #[arg(long)]
        pool: PathBuf,
        #[arg(long)]
        trace: PathBuf,
        /// Engine state JSON (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the static cluster-distance table
    Clusters,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Eval { case, out } => {
            let results = run_synthetic_suite(case.as_deref());
            if results.is_empty() {
                return Err(format!("unknown case: {}", case.unwrap_or_default()).into());
            }
            let (writer, handle) = JsonlWriter::<EvaluationResult>::create(out)?;
            for result in results {
                writer.write(result)?;
            }
            drop(writer);
            handle.finish()?;
        }
        Commands::Play {
            pool,
            config,
            axes,
            rng_seed,
            trace,
            out,
        } => {
            let candidates = load_candidate_pool(&pool)?;
            let mut cfg = match config {
                Some(path) => load_session_config(path)?,
                None => SessionConfig::default(),
            };
            if rng_seed.is_some() {
                cfg.rng_seed = rng_seed;
            }
            let lookup = load_lookup(axes.as_ref())?;

            let mut trace_handle = None;
            let mut session = Session::new(candidates, cfg);
            if let Some(path) = trace {
                let (sink, handle) = JsonlTraceSink::create(path)?;
                let sink: Arc<dyn TraceSink> = Arc::new(sink);
                session = session.with_trace(sink);
                trace_handle = Some(handle);
            }

            let stdin = io::stdin();
            let mut stderr = io::stderr();
            play(&mut session, stdin.lock(), &mut stderr)?;

            let outcome = session.finish(&lookup);
            drop(session);
            if let Some(handle) = trace_handle {
                let rows = handle.finish()?;
                tracing::debug!(rows, "Trace written");
            }

            emit_json(&outcome, out)?;
        }
        Commands::Extract {
            state,
            axes,
            renormalize,
        } => {
            let state: EngineState = read_json(&state)?;
            let lookup = load_lookup(axes.as_ref())?;
            let policy = if renormalize {
                MissingAxisPolicy::Renormalize
            } else {
                MissingAxisPolicy::Dilute
            };
            let payload = serde_json::json!({
                "signals": extract_signals(&state),
                "axes": extract_axes_with(&state, &lookup, policy),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Replay { pool, trace, out } => {
            let candidates = load_candidate_pool(&pool)?;
            let rows: Vec<TraceRecord> = read_jsonl(&trace)?;
            let state = replay(candidates, &rows, &Config::default())?;
            emit_json(&state, out)?;
        }
        Commands::Clusters => {
            for (a, b, d) in CLUSTER_DISTANCES {
                println!("{a}\t{b}\t{d:.2}");
            }
        }
    }

    Ok(())
}

/// Drive the session from line-based input until it stops or input ends.
fn play(
    session: &mut Session,
    input: impl BufRead,
    prompt: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = input.lines();

    'session: while session.stop_reason().is_none() {
        let Some(pair) = session.next_pair() else {
            break;
        };
        let round = session.state().round + 1;
        let total = session.config().total_rounds;
        writeln!(
            prompt,
            "[{round}/{total}] 1) {} ({}; {})  vs  2) {} ({}; {})",
            pair.a.id(),
            pair.a.cluster(),
            pair.a.candidate.tags.join(", "),
            pair.b.id(),
            pair.b.cluster(),
            pair.b.candidate.tags.join(", "),
        )?;

        loop {
            let Some(line) = lines.next() else {
                break 'session;
            };
            let (winner, loser) = match line?.trim() {
                "1" => (pair.a.id(), pair.b.id()),
                "2" => (pair.b.id(), pair.a.id()),
                "u" => {
                    if !session.undo() {
                        writeln!(prompt, "nothing to undo")?;
                    }
                    continue 'session;
                }
                "q" => break 'session,
                other => {
                    writeln!(prompt, "expected 1, 2, u or q; got {other:?}")?;
                    continue;
                }
            };
            if let RecordOutcome::Ignored = session.record(winner, loser)? {
                writeln!(prompt, "choice ignored")?;
            }
            break;
        }
    }

    if let Some(reason) = session.stop_reason() {
        writeln!(prompt, "session stopped: {reason:?}")?;
    }
    Ok(())
}

fn emit_json<T: serde::Serialize>(
    value: &T,
    out: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn load_lookup(path: Option<&PathBuf>) -> Result<AxisLookup, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => load_axis_lookup(path)?,
        None => AxisLookup::new(),
    })
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
