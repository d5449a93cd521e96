//! Shared domain types for Kindred.
//!
//! This crate contains the domain records used across the Kindred backend:
//! sessions, messages, personas, session scratch state, decision outputs,
//! LLM request shapes, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod decision;
pub mod error;
pub mod llm;
pub mod persona;
pub mod state;
