//! The error taxonomy used across the pipeline.
//!
//! Each variant corresponds to one of the failure kinds named in the
//! design: only [`PipelineError::Data`] is recovered at the row level
//! inside a stage; every other variant aborts the stage.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("batch directory already in use: {0}")]
    InUse(PathBuf),

    #[error("batch {batch_id} is past 'annot' but not past 'tables'; {hint}")]
    InProgress { batch_id: u32, hint: String },

    #[error("cluster job(s) failed: {0:?}")]
    ClusterFailure(Vec<String>),

    #[error("tracking table inconsistent with disk: {0}")]
    InconsistentState(String),

    #[error("malformed data at {location}: {reason}")]
    Data { location: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn data(location: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Data {
            location: location.into(),
            reason: reason.into(),
        }
    }
}
