use super::config::ConfigError;
use super::state::SweepState;
use crate::core::io::checkpoint::CheckpointError;
use crate::core::series::{ConsistencyError, SeriesError, SeriesTag};
use std::error::Error as StdError;
use thiserror::Error;

/// An opaque failure reported by the solver collaborator.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SolverError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl SolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid sweep configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Solver construction failed at point {index} (coordinate {coordinate}): {source}")]
    SolverConstruction {
        index: usize,
        coordinate: f64,
        #[source]
        source: SolverError,
    },

    #[error(
        "Solver failed to compute series '{tag}' at point {index} (coordinate {coordinate}): {source}"
    )]
    SolverCompute {
        tag: SeriesTag,
        index: usize,
        coordinate: f64,
        #[source]
        source: SolverError,
    },

    #[error("Result series error: {0}")]
    Series(#[from] SeriesError),

    #[error("Merge consistency check failed: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Transport failure on rank {rank}: {reason}")]
    Transport { rank: usize, reason: String },

    #[error("Invalid sweep state transition from {from:?} to {to:?}")]
    InvalidTransition { from: SweepState, to: SweepState },

    #[error("Rank {rank} panicked: {message}")]
    RankPanicked { rank: usize, message: String },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Transport failures are usually a symptom of another rank aborting first.
    pub fn is_transport(&self) -> bool {
        matches!(self, EngineError::Transport { .. })
    }
}
