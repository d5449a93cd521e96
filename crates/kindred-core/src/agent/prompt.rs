//! Prompt text and transcript formatting for the decision components.

use kindred_types::chat::{ChatMessage, SenderKind};
use kindred_types::persona::{Persona, ProactiveBehavior};

/// Appended to every reply system prompt, after the persona text.
pub const SPLIT_MESSAGE_INSTRUCTIONS: &str = r#"You may split your reply into several short messages when that reads better.
To split, reply with ONLY a JSON object in exactly this shape:
{"messages": ["first message", "second message"]}

To send a single message, reply with plain text as usual.

Rules:
- When you use the JSON form, the whole reply must be valid JSON and nothing else
- Each message should carry one complete thought
- Split only when the reply naturally has parts (a greeting and an answer, or several steps)
- Reply in the language the user writes in"#;

const DEFAULT_PERSONALITY: &str = "You are a helpful, friendly conversational companion.";

/// Build the reply system prompt: persona text, then the split-message convention.
pub fn build_reply_system_prompt(persona: &Persona) -> String {
    let personality = persona.personality_prompt.trim();
    let personality = if personality.is_empty() {
        DEFAULT_PERSONALITY
    } else {
        personality
    };
    format!("{personality}\n\n{SPLIT_MESSAGE_INSTRUCTIONS}")
}

fn speaker(sender: SenderKind) -> &'static str {
    match sender {
        SenderKind::User => "User",
        SenderKind::Assistant | SenderKind::Growth => "Assistant",
    }
}

/// Render messages as `Speaker: text` lines in order.
pub fn format_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", speaker(m.sender), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub const SUMMARY_SYSTEM_PROMPT: &str = "You write short topic lines for chat sessions. \
Reply with the topic text only: one or two sentences, at most 100 characters, no quotes.";

pub fn summary_prompt(previous_summary: &str, transcript: &str) -> String {
    if previous_summary.trim().is_empty() {
        format!(
            "Here is a chat conversation:\n{transcript}\n\n\
             Write a brief topic (max 100 characters) capturing what the conversation is about."
        )
    } else {
        format!(
            "The current topic of this conversation is:\n\"{previous_summary}\"\n\n\
             Here is the conversation so far:\n{transcript}\n\n\
             Write an updated topic (max 100 characters) that takes the newer messages into account."
        )
    }
}

pub fn personality_prompt(
    current_personality: &str,
    message_count: u32,
    summary: &str,
    transcript: &str,
) -> String {
    format!(
        r#"You are reviewing a chat conversation to decide whether the assistant's personality prompt should change.

Current personality prompt: "{current_personality}"
Message count: {message_count}
Session summary: {summary}

Recent conversation:
{transcript}

Consider the user's tone and formality, the topics discussed, how much detail they want, and whether they seem satisfied with the current replies.

Respond ONLY with a JSON object in exactly this shape:
{{"should_update": true or false, "reason": "explanation", "suggested_personality": "new personality prompt or null", "confidence": 0.0 to 1.0}}

A suggested personality must be a clear, concise prompt describing how the assistant should behave."#
    )
}

pub fn proactive_prompt(
    summary: &str,
    message_count: u32,
    minutes_inactive: f64,
    behavior: ProactiveBehavior,
    unread_count: u32,
    transcript: &str,
) -> String {
    let unread_info = if unread_count > 0 {
        format!("\nUnread assistant messages: {unread_count}")
    } else {
        String::new()
    };
    format!(
        r#"You are deciding whether the assistant should speak first in an idle chat.

Current summary: {summary}
Message count: {message_count}
Minutes inactive: {minutes_inactive:.1}
User preference for proactivity: {behavior}{unread_info}

Recent conversation:
{transcript}

Choose one action:
1. "continue" - follow up on the current topic
2. "new_topic" - suggest a new, related topic
3. "wait" - leave the user alone for now

Consider whether the conversation reached a natural stop, whether questions were left open, whether a follow-up would add value or feel pushy, and the user's proactivity preference.

Respond ONLY with a JSON object in exactly this shape:
{{"action": "continue|new_topic|wait", "reason": "brief explanation", "suggested_message": "message to send or null"}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kindred_types::persona::NewPersona;

    #[test]
    fn test_reply_prompt_appends_split_instructions_after_persona() {
        let mut persona = NewPersona::default_for("gpt-4o").into_persona("alice", Utc::now());
        persona.personality_prompt = "You are a pirate.".to_string();
        let prompt = build_reply_system_prompt(&persona);
        assert!(prompt.starts_with("You are a pirate."));
        assert!(prompt.ends_with(SPLIT_MESSAGE_INSTRUCTIONS));
    }

    #[test]
    fn test_reply_prompt_with_empty_persona_still_has_instructions() {
        let persona = NewPersona::default_for("gpt-4o").into_persona("alice", Utc::now());
        let prompt = build_reply_system_prompt(&persona);
        assert!(prompt.starts_with(DEFAULT_PERSONALITY));
        assert!(prompt.contains(r#"{"messages""#));
    }

    #[test]
    fn test_transcript_labels_growth_as_assistant() {
        let now = Utc::now();
        let messages = vec![
            ChatMessage::new(SenderKind::User, "hi", now),
            ChatMessage::new(SenderKind::Growth, "still there?", now),
        ];
        assert_eq!(format_transcript(&messages), "User: hi\nAssistant: still there?");
    }

    #[test]
    fn test_summary_prompt_mentions_previous_topic() {
        assert!(summary_prompt("Rust lifetimes", "User: hi").contains("Rust lifetimes"));
        assert!(!summary_prompt("", "User: hi").contains("current topic"));
    }

    #[test]
    fn test_proactive_prompt_includes_unread_only_when_present() {
        let with = proactive_prompt("s", 6, 12.0, ProactiveBehavior::Aggressive, 2, "");
        assert!(with.contains("Unread assistant messages: 2"));
        assert!(with.contains("aggressive"));
        let without = proactive_prompt("s", 6, 12.0, ProactiveBehavior::Balanced, 0, "");
        assert!(!without.contains("Unread"));
    }
}
