//! Persona (agent configuration) types.
//!
//! A persona is a named bundle of model choice, personality prompt, and
//! tuning parameters, owned by one end user. `(owner_id, name)` is unique.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Name of the persona created on first contact.
pub const DEFAULT_PERSONA_NAME: &str = "default";

/// Model assigned to personas created without an explicit choice.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Inactivity threshold used when a persona does not set one.
pub const DEFAULT_INACTIVITY_THRESHOLD_MINUTES: u32 = 5;

/// How eager the persona is to re-engage an idle user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProactiveBehavior {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl fmt::Display for ProactiveBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProactiveBehavior::Conservative => write!(f, "conservative"),
            ProactiveBehavior::Balanced => write!(f, "balanced"),
            ProactiveBehavior::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl FromStr for ProactiveBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(ProactiveBehavior::Conservative),
            "balanced" => Ok(ProactiveBehavior::Balanced),
            "aggressive" => Ok(ProactiveBehavior::Aggressive),
            other => Err(format!("invalid proactive behavior: '{other}'")),
        }
    }
}

/// Timing parameters for a persona.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaTimings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactivity_threshold_minutes: Option<u32>,
}

impl PersonaTimings {
    pub fn inactivity_threshold(&self) -> u32 {
        self.inactivity_threshold_minutes
            .unwrap_or(DEFAULT_INACTIVITY_THRESHOLD_MINUTES)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    /// Target model identifier passed to the LLM provider.
    pub model: String,
    /// Free-text personality/style prompt. Overwritten in place, never versioned.
    pub personality_prompt: String,
    /// Auxiliary tuning parameters.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub timings: PersonaTimings,
    #[serde(default)]
    pub proactive_behavior: ProactiveBehavior,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPersona {
    pub name: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub personality_prompt: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub timings: PersonaTimings,
    #[serde(default)]
    pub proactive_behavior: ProactiveBehavior,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl NewPersona {
    /// The persona every owner gets on first contact.
    pub fn default_for(model: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_PERSONA_NAME.to_string(),
            model: model.into(),
            personality_prompt: String::new(),
            parameters: serde_json::Map::new(),
            timings: PersonaTimings::default(),
            proactive_behavior: ProactiveBehavior::default(),
        }
    }

    pub fn into_persona(self, owner_id: impl Into<String>, now: DateTime<Utc>) -> Persona {
        Persona {
            id: Uuid::now_v7(),
            owner_id: owner_id.into(),
            name: self.name,
            model: self.model,
            personality_prompt: self.personality_prompt,
            parameters: self.parameters,
            timings: self.timings,
            proactive_behavior: self.proactive_behavior,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial edit of a persona. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality_prompt: Option<String>,
    /// Replaces the whole parameter map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timings: Option<PersonaTimings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proactive_behavior: Option<ProactiveBehavior>,
}

impl PersonaPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Copy the present fields onto `persona` and stamp `updated_at`.
    pub fn apply(self, persona: &mut Persona, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            persona.name = name;
        }
        if let Some(model) = self.model {
            persona.model = model;
        }
        if let Some(prompt) = self.personality_prompt {
            persona.personality_prompt = prompt;
        }
        if let Some(parameters) = self.parameters {
            persona.parameters = parameters;
        }
        if let Some(timings) = self.timings {
            persona.timings = timings;
        }
        if let Some(behavior) = self.proactive_behavior {
            persona.proactive_behavior = behavior;
        }
        persona.updated_at = now;
    }
}
