//! Error types for the inference runtime.

use thiserror::Error;

/// Inference runtime error type.
///
/// Construction-time variants (`ModelNotFound`, `TokenizerNotFound`,
/// `Tokenizer`, `ModelLoad`) abort filter-chain configuration. `Compile`
/// surfaces once per worker thread out of the first classify call on that
/// thread. `Execution` is fatal only for the stream that issued the call.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Model file not found.
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    /// Tokenizer file not found.
    #[error("Tokenizer file not found: {0}")]
    TokenizerNotFound(String),

    /// Tokenizer load or encode error.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Model file could not be read or parsed.
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    /// Per-thread model compilation failure.
    #[error("Failed to compile model: {0}")]
    Compile(String),

    /// Engine fault during a single classify call.
    #[error("Inference error: {0}")]
    Execution(String),
}
