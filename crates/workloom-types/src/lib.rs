//! Shared domain types for Workloom.
//!
//! This crate contains the core domain types used across the Workloom
//! durable execution engine: activity tasks and outcomes, workflow instances
//! and their event histories, byte-buffer representations for hash inputs,
//! and the associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror,
//! plus hex/base64 for byte-buffer encodings.

pub mod config;
pub mod error;
pub mod hash;
pub mod task;
pub mod workflow;
