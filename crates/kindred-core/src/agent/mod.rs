//! The decision components that sit on top of a conversation.
//!
//! Each component takes plain inputs, may call the LLM, and always returns a
//! value: failures are absorbed into a documented fallback. None of them
//! touch persistence.

pub mod personality;
pub mod proactive;
pub mod prompt;
pub mod responder;
pub mod split;
pub mod summarizer;
