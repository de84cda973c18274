//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod deployment;
pub mod pipeline_run;
pub mod stack;

// Re-export for convenience
pub use deployment as deployment_service;
pub use pipeline_run as pipeline_run_service;
pub use stack as stack_service;
