//! Text extraction from inspected bodies.

use serde_json::Value;

/// Extracts the classification input from a request or response body.
///
/// The body is expected to be a JSON object carrying a string field named
/// `text`. Parse failure, a missing field, or a non-string value all degrade
/// to the empty string; the classifier decides what empty input means, the
/// filter never special-cases it.
pub fn extract_text(body: &[u8]) -> String {
    let json: Value = match serde_json::from_slice(body) {
        Ok(json) => json,
        Err(_) => return String::new(),
    };

    json.get("text")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default()
}
