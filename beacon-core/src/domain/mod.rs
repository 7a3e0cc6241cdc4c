//! Core domain types
//!
//! This module contains the core domain structures used across Beacon services.
//! The orchestrator persists them; clients and the HTTP API exchange them.

pub mod diff;
pub mod execution;
pub mod job;
pub mod queue;
