//! Filter settings and the per-chain filter factory.

use std::sync::Arc;

use serde::Deserialize;

use guardrail_inference::{InferenceRuntime, OnnxRuntime, RuntimeConfig};

use crate::error::{FilterError, Result};
use crate::filter::{Action, Filter, FilterConfig, Source};

/// Registration identifier used by the host's filter-chain lookup.
pub const FILTER_NAME: &str = "http.guardrail";

fn default_max_length() -> usize {
    512
}

fn default_threshold() -> f64 {
    0.5
}

/// Decoded filter settings, as handed over by the host's configuration
/// layer.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailSettings {
    /// Path to the ONNX model file.
    pub model_path: String,
    /// Path to the tokenizer.json file; defaults to `tokenizer.json` next to
    /// the model.
    #[serde(default)]
    pub tokenizer_path: Option<String>,
    /// Decision threshold.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Which side of the stream to inspect.
    pub source: Source,
    /// What a classifier match means.
    pub action: Action,
    /// Maximum sequence length (tokens).
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl GuardrailSettings {
    /// Decodes settings from their JSON form.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| FilterError::Settings(e.to_string()))
    }
}

/// Creates one [`Filter`] per stream from one shared configuration.
///
/// Construction loads and validates the model; a factory that exists can
/// always create filters.
pub struct FilterFactory {
    config: Arc<FilterConfig>,
}

impl std::fmt::Debug for FilterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterFactory").finish_non_exhaustive()
    }
}

impl FilterFactory {
    /// Builds the ONNX runtime from the settings and wraps it in a shared
    /// configuration. Model or tokenizer problems abort construction; the
    /// filter chain must not come up half-configured.
    pub fn new(settings: &GuardrailSettings) -> Result<Self> {
        let runtime = OnnxRuntime::new(RuntimeConfig {
            model_path: settings.model_path.clone(),
            tokenizer_path: settings.tokenizer_path.clone(),
            threshold: settings.threshold,
            max_length: settings.max_length,
        })?;
        Ok(Self::with_runtime(
            Arc::new(runtime),
            settings.source,
            settings.action,
        ))
    }

    /// Builds a factory around an already-constructed runtime.
    pub fn with_runtime(
        runtime: Arc<dyn InferenceRuntime>,
        source: Source,
        action: Action,
    ) -> Self {
        Self {
            config: Arc::new(FilterConfig::new(runtime, source, action)),
        }
    }

    /// Creates a filter for a new stream, with its own inference session.
    pub fn create_filter(&self) -> Filter {
        Filter::new(Arc::clone(&self.config))
    }

    /// The registration identifier.
    pub fn name(&self) -> &'static str {
        FILTER_NAME
    }
}
