//! Bulk query errors

use bulkq_core::{BulkqError, Target};
use thiserror::Error;

/// Why one target failed
#[derive(Debug, Error)]
pub enum TargetError {
    /// Connect failed or timed out
    #[error("{0}")]
    Connection(#[source] BulkqError),

    /// A batch failed or timed out. Earlier batches stay applied.
    #[error("{source}")]
    Execution {
        batch: usize,
        #[source]
        source: BulkqError,
    },

    #[error("no driver registered for '{0}'")]
    UnknownDriver(String),

    /// The task running this target panicked or was cancelled
    #[error("execution aborted: {0}")]
    Aborted(String),
}

impl TargetError {
    pub fn is_timeout(&self) -> bool {
        match self {
            TargetError::Connection(err) | TargetError::Execution { source: err, .. } => {
                err.is_timeout()
            }
            _ => false,
        }
    }
}

/// A target failure, qualified with the target's label
#[derive(Debug, Error)]
#[error("{label}: {error}")]
pub struct TargetFailure {
    label: String,
    #[source]
    error: TargetError,
}

impl TargetFailure {
    pub fn new(target: &Target, error: TargetError) -> Self {
        Self {
            label: target.label(),
            error,
        }
    }

    /// `<database> - <server>`
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn error(&self) -> &TargetError {
        &self.error
    }
}
