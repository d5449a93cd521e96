//! LLM provider abstraction and the gateway every decision component calls.

pub mod box_provider;
pub mod client;
pub mod provider;
pub mod structured;
