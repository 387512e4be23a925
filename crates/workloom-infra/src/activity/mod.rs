//! Concrete activity implementations.

pub mod hash;
