//! Observability bootstrap for Kindred.

pub mod tracing_setup;
