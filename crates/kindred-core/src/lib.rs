//! Session decision engine and repository trait definitions for Kindred.
//!
//! This crate defines the "ports" (repository and LLM provider traits) that
//! the infrastructure layer implements, plus everything that decides what
//! happens to a session: reply generation, summarization, personality
//! adaptation, and proactive re-engagement. It depends only on
//! `kindred-types` -- never on `kindred-infra` or any database/IO crate.

pub mod agent;
pub mod chat;
pub mod clock;
pub mod llm;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;
