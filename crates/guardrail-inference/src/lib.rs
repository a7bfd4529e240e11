//! Guardrail Inference - ONNX classification runtime for the guardrail filter.
//!
//! This crate owns the expensive half of the content gate: loading a text
//! classification model, compiling it once per worker thread, and running
//! single-input inference for the stream filter.
//!
//! ## Architecture
//!
//! ```text
//! FilterConfig ──▶ OnnxRuntime (model bytes + tokenizer + threshold)
//!                       │
//!                       │ compiled()            one compiled session
//!                       ▼                        per worker thread
//!                  WorkerLocal<Mutex<Session>> ◀────────────────────
//!                       ▲
//!                       │ classify()
//!                  OnnxSession (one per HTTP stream)
//! ```
//!
//! The uncompiled model is read once and shared read-only across all worker
//! threads. The compiled session is hardware-specific and not meant to be
//! shared across threads, so each worker compiles its own copy lazily on
//! first use and reuses it for every later stream on that thread.

use std::sync::Arc;

mod error;
mod runtime;
mod session;
mod worker;

pub use error::InferenceError;
pub use runtime::{OnnxRuntime, RuntimeConfig};
pub use session::OnnxSession;
pub use worker::WorkerLocal;

/// A single classification execution context, one per HTTP stream.
///
/// `classify` blocks the caller until the result is ready. There is no
/// cancellation and no timeout; a fault in the engine surfaces as an
/// [`InferenceError`] and is fatal for the stream that issued the call.
pub trait InferenceSession: Send {
    /// Classifies the input text, returning whether the score exceeded the
    /// runtime's threshold.
    fn classify(&mut self, input: &str) -> Result<bool, InferenceError>;
}

/// A classify-capable engine shared by every stream of a filter chain.
pub trait InferenceRuntime: Send + Sync {
    /// Creates a new session bound to this runtime. Always succeeds once the
    /// runtime itself has been constructed.
    fn create_session(self: Arc<Self>) -> Box<dyn InferenceSession>;
}
