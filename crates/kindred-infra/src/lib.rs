//! Infrastructure layer for Kindred.
//!
//! Contains implementations of the repository traits defined in `kindred-core`
//! (SQLite storage), the OpenAI-compatible LLM provider, and the configuration
//! loader.

pub mod config;
pub mod llm;
pub mod sqlite;
