//! File loaders for session config, candidate pools, and axis lookups.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::axes::AxisLookup;
use crate::rating_engine::Candidate;
use crate::session::SessionConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_session_config(path: impl AsRef<Path>) -> Result<SessionConfig, ConfigError> {
    let cfg: SessionConfig = read_json(path.as_ref())?;
    validate_session_config(&cfg)?;
    Ok(cfg)
}

pub fn validate_session_config(cfg: &SessionConfig) -> Result<(), ConfigError> {
    if cfg.total_rounds == 0 {
        return Err(ConfigError::Invalid("total_rounds must be >= 1".to_string()));
    }
    if cfg.min_rounds > cfg.total_rounds {
        return Err(ConfigError::Invalid(format!(
            "min_rounds ({}) must be <= total_rounds ({})",
            cfg.min_rounds, cfg.total_rounds
        )));
    }
    Ok(())
}

/// Load a JSON array of candidates. Ids must be non-empty and unique.
pub fn load_candidate_pool(path: impl AsRef<Path>) -> Result<Vec<Candidate>, ConfigError> {
    let pool: Vec<Candidate> = read_json(path.as_ref())?;
    validate_candidate_pool(&pool)?;
    Ok(pool)
}

pub fn validate_candidate_pool(pool: &[Candidate]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for c in pool {
        if c.id.trim().is_empty() {
            return Err(ConfigError::Invalid("candidate id must be non-empty".to_string()));
        }
        if !seen.insert(c.id.as_str()) {
            return Err(ConfigError::Invalid(format!("duplicate candidate id: {}", c.id)));
        }
    }
    if let Some(dangling) = pool
        .iter()
        .filter_map(|c| c.paired_with_id())
        .find(|other| !seen.contains(other))
    {
        tracing::warn!(paired_with = %dangling, "paired_with references an unknown candidate");
    }
    Ok(())
}

/// Load a JSON object mapping candidate id to its six coordinates.
pub fn load_axis_lookup(path: impl AsRef<Path>) -> Result<AxisLookup, ConfigError> {
    let lookup: AxisLookup = read_json(path.as_ref())?;
    if let Some((id, _)) = lookup.iter().find(|(_, axes)| !axes.is_finite()) {
        return Err(ConfigError::Invalid(format!(
            "non-finite axis coordinate for {id}"
        )));
    }
    Ok(lookup)
}
