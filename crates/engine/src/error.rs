//! Error taxonomy for the report pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The uploaded document is not a recognizable report, or contains no
    /// extractable rows. Row-level problems degrade gracefully instead.
    #[error("unsupported report format: {0}")]
    Format(String),

    /// Caller-supplied criteria violate a stated constraint.
    #[error("invalid criteria: {0}")]
    Validation(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
