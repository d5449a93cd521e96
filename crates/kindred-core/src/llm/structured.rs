//! Lenient extraction of JSON objects from model output.
//!
//! Models wrap JSON in markdown fences, prefix it with reasoning, or trail
//! it with commentary. Parsing tries the trimmed text, then the text with
//! fences removed, then the outermost `{...}` block.

use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum StructuredOutputError {
    #[error("no JSON object found in model output")]
    NoJson,

    #[error("invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Strip a surrounding ```` ```json ```` or ```` ``` ```` fence, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"));
    match body.and_then(|rest| rest.trim_end().strip_suffix("```")) {
        Some(inner) => inner.trim(),
        None => trimmed,
    }
}

/// The slice from the first `{` to the last `}`, if both exist in order.
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Drop any reasoning preamble a model emits before its answer.
fn after_reasoning(text: &str) -> &str {
    match text.rfind("</think>") {
        Some(pos) => &text[pos + "</think>".len()..],
        None => text,
    }
}

/// Parse a JSON value of type `T` out of free-form model output.
pub fn parse_json_lenient<T: DeserializeOwned>(text: &str) -> Result<T, StructuredOutputError> {
    let text = after_reasoning(text).trim();

    if let Ok(value) = serde_json::from_str::<T>(text) {
        return Ok(value);
    }

    let unfenced = strip_code_fences(text);
    if unfenced != text {
        if let Ok(value) = serde_json::from_str::<T>(unfenced) {
            return Ok(value);
        }
    }

    let block = outermost_object(unfenced).ok_or(StructuredOutputError::NoJson)?;
    Ok(serde_json::from_str::<T>(block)?)
}
