//! HTTP/REST API layer for Workloom.
//!
//! Axum-based API exposing the upload and polling endpoints the frontend
//! consumes, with permissive CORS and request tracing.

pub mod error;
pub mod handlers;
pub mod router;
