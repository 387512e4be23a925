//! Durable execution core for Workloom.
//!
//! This crate defines the engines and the "ports" (repository and queue
//! traits) that the infrastructure layer implements. It depends only on
//! `workloom-types` -- never on `workloom-infra` or any database/IO crate.
//!
//! - `registry` -- immutable activity/workflow lookup tables built at startup
//! - `activity` -- the activity execution engine (retry, timeout, outcomes)
//! - `workflow` -- definitions, replay, the drive loop, and the client handle
//! - `queue` -- the durable queue port and channel message types
//! - `repository` -- the execution store port (instances, events, outcomes)
//! - `worker` -- the two worker pools wiring queues to engines

pub mod activity;
pub mod queue;
pub mod registry;
pub mod repository;
pub mod worker;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testutil;
