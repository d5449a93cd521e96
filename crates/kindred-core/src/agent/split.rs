//! Parser for the optional split-message envelope.
//!
//! A model may answer with `{"messages": ["a", "b"]}` to deliver several
//! bubbles. Anything that is not exactly that shape is a single message.

use serde_json::Value;

use crate::llm::structured::strip_code_fences;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("reply is not JSON")]
    NotJson,

    #[error("reply JSON is not an object")]
    NotAnObject,

    #[error("reply object has no \"messages\" key")]
    MissingMessages,

    #[error("\"messages\" is not a list")]
    MessagesNotAList,

    #[error("\"messages\" item {0} is not a string")]
    NonStringItem(usize),

    #[error("\"messages\" has no non-blank items")]
    Empty,
}

/// Parse a split envelope into its message texts.
///
/// Code fences around the JSON are tolerated. Blank items are dropped.
pub fn parse_split_envelope(text: &str) -> Result<Vec<String>, SplitError> {
    let body = strip_code_fences(text);
    let value: Value = serde_json::from_str(body).map_err(|_| SplitError::NotJson)?;
    let Value::Object(mut object) = value else {
        return Err(SplitError::NotAnObject);
    };
    let messages = object.remove("messages").ok_or(SplitError::MissingMessages)?;
    let Value::Array(items) = messages else {
        return Err(SplitError::MessagesNotAList);
    };

    let mut parts = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::String(part) = item else {
            return Err(SplitError::NonStringItem(index));
        };
        let part = part.trim();
        if !part.is_empty() {
            parts.push(part.to_string());
        }
    }

    if parts.is_empty() {
        return Err(SplitError::Empty);
    }
    Ok(parts)
}

/// A generated reply: one message or several in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Single(String),
    Split(Vec<String>),
}

impl Reply {
    /// Interpret raw model output, degrading to a single message on any
    /// envelope error.
    pub fn from_model_output(text: &str) -> Self {
        match parse_split_envelope(text) {
            Ok(mut parts) if parts.len() == 1 => Reply::Single(parts.remove(0)),
            Ok(parts) => Reply::Split(parts),
            Err(err) => {
                if !matches!(err, SplitError::NotJson) {
                    tracing::debug!(error = %err, "Reply looked like a split envelope but was not; keeping raw text");
                }
                Reply::Single(text.trim().to_string())
            }
        }
    }

    pub fn into_parts(self) -> Vec<String> {
        match self {
            Reply::Single(text) => vec![text],
            Reply::Split(parts) => parts,
        }
    }
}
