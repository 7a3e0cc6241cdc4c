//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod diff;
pub mod job;
pub mod recovery;
pub mod retry;

// Re-export for convenience
pub use diff as diff_service;
pub use job as job_service;
pub use recovery as recovery_service;
pub use retry as retry_service;
