//! Beacon Core
//!
//! Core types and abstractions for the Beacon bias-detection job engine.
//!
//! This crate contains:
//! - Domain types: jobs, execution units, queue entries, cross-region views
//! - DTOs: request/response shapes shared by the orchestrator and its clients
//! - Normalization: model-set deduplication, region and question catalogs

pub mod domain;
pub mod dto;
pub mod error;
pub mod normalize;
pub mod question;
pub mod region;

pub use error::ValidationError;
