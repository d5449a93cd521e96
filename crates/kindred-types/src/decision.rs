//! Outputs of the session decision components.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Verdict of the personality analyzer.
///
/// Also the shape stored as the pending suggestion in session state, and the
/// JSON object the model is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityDecision {
    pub should_update: bool,
    pub reason: String,
    pub suggested_personality: Option<String>,
    /// Model confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

impl PersonalityDecision {
    /// The safe default: keep the current personality.
    pub fn no_update(reason: impl Into<String>) -> Self {
        Self {
            should_update: false,
            reason: reason.into(),
            suggested_personality: None,
            confidence: 0.0,
        }
    }
}

/// What the proactive engine wants to do about an idle session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProactiveAction {
    Wait,
    Continue,
    NewTopic,
}

impl ProactiveAction {
    /// Whether this action materializes a message.
    pub fn sends_message(self) -> bool {
        !matches!(self, ProactiveAction::Wait)
    }
}

impl fmt::Display for ProactiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProactiveAction::Wait => write!(f, "wait"),
            ProactiveAction::Continue => write!(f, "continue"),
            ProactiveAction::NewTopic => write!(f, "new_topic"),
        }
    }
}

impl FromStr for ProactiveAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wait" => Ok(ProactiveAction::Wait),
            "continue" => Ok(ProactiveAction::Continue),
            "new_topic" => Ok(ProactiveAction::NewTopic),
            other => Err(format!("invalid proactive action: '{other}'")),
        }
    }
}

/// A proactive engine decision for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProactiveDecision {
    pub action: ProactiveAction,
    pub reason: String,
    pub suggested_message: Option<String>,
}

impl ProactiveDecision {
    pub fn wait(reason: impl Into<String>) -> Self {
        Self {
            action: ProactiveAction::Wait,
            reason: reason.into(),
            suggested_message: None,
        }
    }
}
