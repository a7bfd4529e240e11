//! Error types for the filter.

use thiserror::Error;

use guardrail_inference::InferenceError;

/// Filter error type.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Inference runtime or execution error.
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    /// Filter settings could not be decoded.
    #[error("Invalid filter settings: {0}")]
    Settings(String),
}

/// Result type for filter operations.
pub type Result<T> = std::result::Result<T, FilterError>;
