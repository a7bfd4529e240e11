//! ONNX runtime: model ownership and per-thread compilation.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokenizers::Tokenizer;

use crate::error::InferenceError;
use crate::session::OnnxSession;
use crate::worker::WorkerLocal;
use crate::{InferenceRuntime, InferenceSession};

/// Configuration for the ONNX classification runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Path to the ONNX model file.
    pub model_path: String,
    /// Path to the tokenizer.json file. Defaults to `tokenizer.json` next to
    /// the model file.
    pub tokenizer_path: Option<String>,
    /// Decision threshold; a score strictly above it counts as matched.
    pub threshold: f64,
    /// Maximum sequence length (tokens).
    pub max_length: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_path: "models/classifier.onnx".to_string(),
            tokenizer_path: None,
            threshold: 0.5,
            max_length: 512,
        }
    }
}

impl RuntimeConfig {
    fn resolved_tokenizer_path(&self) -> String {
        match &self.tokenizer_path {
            Some(path) => path.clone(),
            None => Path::new(&self.model_path)
                .with_file_name("tokenizer.json")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

/// ONNX classification runtime.
///
/// Owns the uncompiled model bytes and the tokenizer, both shared read-only
/// across worker threads, and a per-thread registry of compiled sessions.
/// Construction failures are configuration-time failures: the filter chain
/// must not come up with a runtime that could never serve.
pub struct OnnxRuntime {
    model: Vec<u8>,
    tokenizer: Tokenizer,
    threshold: f64,
    max_length: usize,
    compiled: WorkerLocal<Mutex<ort::session::Session>>,
}

impl std::fmt::Debug for OnnxRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxRuntime")
            .field("model_len", &self.model.len())
            .field("threshold", &self.threshold)
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

impl OnnxRuntime {
    /// Loads the tokenizer and model and compiles the model for the
    /// constructing thread.
    ///
    /// The eager compile both validates that the model parses and seeds the
    /// constructing thread's slot; every other worker thread compiles its own
    /// copy lazily on first classify.
    pub fn new(config: RuntimeConfig) -> Result<Self, InferenceError> {
        let tokenizer_path = config.resolved_tokenizer_path();

        if !Path::new(&config.model_path).exists() {
            return Err(InferenceError::ModelNotFound(config.model_path.clone()));
        }
        if !Path::new(&tokenizer_path).exists() {
            return Err(InferenceError::TokenizerNotFound(tokenizer_path));
        }

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        let model = std::fs::read(&config.model_path)
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;

        let runtime = Self {
            model,
            tokenizer,
            threshold: config.threshold,
            max_length: config.max_length,
            compiled: WorkerLocal::new(),
        };

        let session = runtime
            .compile()
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;
        runtime.compiled.set(Mutex::new(session));

        Ok(runtime)
    }

    /// Returns the configured decision threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub(crate) fn max_length(&self) -> usize {
        self.max_length
    }

    pub(crate) fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Returns the calling thread's compiled session, compiling it on first
    /// access.
    ///
    /// The per-thread mutex is never contended: only streams running on the
    /// owning thread reach it, and they run one at a time.
    pub(crate) fn compiled(
        &self,
    ) -> Result<Arc<Mutex<ort::session::Session>>, InferenceError> {
        self.compiled.get_or_try_init(|| {
            tracing::debug!(
                "Compiling model for worker thread {:?}",
                std::thread::current().id()
            );
            self.compile()
                .map(Mutex::new)
                .map_err(|e| InferenceError::Compile(e.to_string()))
        })
    }

    fn compile(&self) -> Result<ort::session::Session, ort::Error> {
        use ort::session::{builder::GraphOptimizationLevel, Session};

        Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .commit_from_memory(&self.model)
    }
}

impl InferenceRuntime for OnnxRuntime {
    fn create_session(self: Arc<Self>) -> Box<dyn InferenceSession> {
        Box::new(OnnxSession::new(self))
    }
}
