//! Observability setup for Workloom.

pub mod tracing_setup;
