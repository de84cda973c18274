//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository handles database operations for a specific domain entity.

pub mod deployment;
pub mod pipeline_run;
pub mod run_log;
pub mod stack;

// Re-export for convenience
pub use deployment as deployment_repository;
pub use pipeline_run as pipeline_run_repository;
pub use run_log as run_log_repository;
pub use stack as stack_repository;
