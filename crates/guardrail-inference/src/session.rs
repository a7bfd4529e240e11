//! Single-stream classification session.

use std::sync::Arc;

use crate::error::InferenceError;
use crate::runtime::OnnxRuntime;
use crate::InferenceSession;

/// One classification execution context, bound to its owning runtime.
///
/// Holds no state of its own beyond the runtime reference; the compiled
/// session it runs against belongs to the calling worker thread.
pub struct OnnxSession {
    runtime: Arc<OnnxRuntime>,
}

impl OnnxSession {
    pub(crate) fn new(runtime: Arc<OnnxRuntime>) -> Self {
        Self { runtime }
    }
}

impl InferenceSession for OnnxSession {
    fn classify(&mut self, input: &str) -> Result<bool, InferenceError> {
        use ort::value::Tensor;

        let encoding = self
            .runtime
            .tokenizer()
            .encode(input, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        let (input_ids, attention_mask) = widen_and_truncate(
            encoding.get_ids(),
            encoding.get_attention_mask(),
            self.runtime.max_length(),
        );
        let seq_len = input_ids.len();

        let input_ids = Tensor::from_array(([1, seq_len], input_ids.into_boxed_slice()))
            .map_err(|e| InferenceError::Execution(e.to_string()))?;
        let attention_mask =
            Tensor::from_array(([1, seq_len], attention_mask.into_boxed_slice()))
                .map_err(|e| InferenceError::Execution(e.to_string()))?;

        let compiled = self.runtime.compiled()?;
        let mut session = compiled.lock();

        let output_name = session
            .outputs()
            .first()
            .map(|output| output.name().to_string())
            .ok_or_else(|| InferenceError::Execution("model has no outputs".to_string()))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask
            ])
            .map_err(|e| InferenceError::Execution(e.to_string()))?;

        let (shape, data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                InferenceError::Execution(format!("Failed to extract output: {}", e))
            })?;

        // A single element is taken as the raw score; two elements are
        // [other, matched] logits.
        let score = match data.len() {
            1 => data[0],
            2 => softmax(data[0], data[1]).1,
            _ => {
                let dims: Vec<_> = shape.iter().collect();
                return Err(InferenceError::Execution(format!(
                    "Unexpected output shape: {:?}",
                    dims
                )));
            }
        };

        tracing::debug!("Inference output: {}", score);

        Ok(f64::from(score) > self.runtime.threshold())
    }
}

/// Widens token ids to the tensor element type and applies the length cap.
fn widen_and_truncate(ids: &[u32], mask: &[u32], max_length: usize) -> (Vec<i64>, Vec<i64>) {
    let seq_len = ids.len().min(max_length);
    let mut input_ids: Vec<i64> = ids[..seq_len].iter().map(|&id| i64::from(id)).collect();
    let mut attention_mask: Vec<i64> =
        mask[..seq_len].iter().map(|&m| i64::from(m)).collect();

    // Some tokenizers emit no tokens at all for empty input; the engine still
    // needs a non-empty sequence axis.
    if input_ids.is_empty() {
        input_ids.push(0);
        attention_mask.push(0);
    }

    (input_ids, attention_mask)
}

/// Computes softmax for two values.
fn softmax(a: f32, b: f32) -> (f32, f32) {
    let max = a.max(b);
    let exp_a = (a - max).exp();
    let exp_b = (b - max).exp();
    let sum = exp_a + exp_b;
    (exp_a / sum, exp_b / sum)
}
