//! Error types for rx-replay

use librx::RxError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReplayError>;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Runtime(#[from] RxError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("line {line}: invalid JSON: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },

    #[error("line {line}: {source}")]
    Action { line: usize, source: RxError },

    #[error("Invalid --state: {0}")]
    State(String),

    #[error("{0} action(s) failed during replay")]
    Failed(usize),
}

impl ReplayError {
    /// Returns the appropriate exit code for this error
    ///
    /// Exit codes:
    /// - 1: Runtime failure while replaying
    /// - 2: Configuration or input error
    pub fn exit_code(&self) -> i32 {
        match self {
            ReplayError::Runtime(err) => err.exit_code(),
            ReplayError::Failed(_) => 1,
            ReplayError::Read { .. }
            | ReplayError::Json { .. }
            | ReplayError::Action { .. }
            | ReplayError::State(_) => 2,
        }
    }
}
