//! Data Transfer Objects for inter-service communication
//!
//! Request and response bodies exchanged between the orchestrator, its HTTP
//! callers and the external inference and aggregation services.

pub mod diff;
pub mod execution;
pub mod inference;
pub mod job;
