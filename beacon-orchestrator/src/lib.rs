//! Beacon Orchestrator
//!
//! Fans bias-detection jobs out into (model, region, question) execution
//! units, runs them through regional worker pools, handles per-unit retries
//! and serves cross-region comparisons.
//!
//! Architecture:
//! - Repositories: Postgres or in-memory storage of jobs, units and queues
//! - Services: fan-out, retry, recovery sweep and diff reconciliation
//! - Workers: one pool per region dispatching to the inference router
//! - API: axum HTTP surface over the services

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
pub mod state;
pub mod worker;

#[cfg(test)]
mod test_support;
