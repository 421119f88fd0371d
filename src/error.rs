//! Error taxonomy for optimization campaigns.
//!
//! Infeasible designs are not errors: a stage that rejects a design reports
//! [`StageOutcome::Rejected`](crate::pipeline::StageOutcome::Rejected) and the
//! candidate is scored with the bad-fitness sentinel. Everything in this
//! module is a failure the campaign cannot score its way around.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CampaignError>;

/// Infrastructure failure raised by an analysis stage.
///
/// Distinct from an infeasible design: these propagate to the campaign
/// runner, which retries or aborts, and are never archived.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("external tool failed: {0}")]
    Tool(String),

    #[error("failed to serialize stage state: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("I/O error on '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive '{path}' is corrupt at byte offset {offset}: {reason}", path = path.display())]
    CorruptArchive {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error(
        "record of {len} bytes exceeds the archive frame limit of {limit} bytes in '{path}'",
        path = path.display()
    )]
    RecordTooLarge {
        path: PathBuf,
        len: usize,
        limit: usize,
    },

    #[error("failed to (de)serialize '{path}': {source}", path = path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "population snapshot '{path}' holds {actual} members but population size is {expected}; \
         changing the population size between runs is not supported",
        path = path.display()
    )]
    SizeMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error(
        "cannot resume from '{path}' with {archived} archived evaluations: {reason}",
        path = path.display()
    )]
    RestartInconsistency {
        path: PathBuf,
        archived: usize,
        reason: String,
    },

    #[error("analysis stage '{stage}' failed during evaluation #{evaluation}: {source}")]
    Infrastructure {
        stage: String,
        evaluation: u64,
        #[source]
        source: StageError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CampaignError {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        CampaignError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this error is a startup-fatal configuration drift between
    /// the persisted stores and the current run.
    pub fn is_restart_inconsistency(&self) -> bool {
        matches!(
            self,
            CampaignError::SizeMismatch { .. } | CampaignError::RestartInconsistency { .. }
        )
    }
}
