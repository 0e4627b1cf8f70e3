//! Crate-level error type.
//!
//! Failures *inside* a command (unknown operation, bad mask, macro cycle)
//! are not errors at this level: they are carried in `CommandOutcome` so a
//! driving UI can always render partial progress. `BitfluxError` covers the
//! boundaries around the engine: arguments, config, result files, scripts.

use thiserror::Error;

pub type BitfluxResult<T> = Result<T, BitfluxError>;

#[derive(Debug, Error)]
pub enum BitfluxError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("result file error: {0}")]
    ResultFile(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
