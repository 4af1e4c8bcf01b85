//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug, PartialEq)]
pub enum RlfolioError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// A combination of settings that cannot be run.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A discretized state that is not a row of the Q-table.
    #[error("State not found in Q-table: return={0}, holding={1}")]
    StateNotFound(f64, f64),

    /// Returns and factors that do not line up.
    #[error("Series shape error: {0}")]
    SeriesShape(String),
}
