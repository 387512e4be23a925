//! Workflow engine core: definitions, replay, the drive loop, and the
//! client-facing handle.
//!
//! - `definition` -- the pure step-function contract and the fan-out stubs
//! - `replay` -- reconstruction of scheduled batches from an event history
//! - `driver` -- the drive loop invoked once per workflow-task delivery
//! - `handle` -- start/load/status/output for client code

pub mod definition;
pub mod driver;
pub mod handle;
pub mod replay;
