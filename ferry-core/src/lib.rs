//! Ferry Core
//!
//! Core types and pure logic for the Ferry deployment orchestrator.
//!
//! This crate contains:
//! - Domain types: desired state, operations, run logs, pipeline runs
//! - DTOs: Data transfer objects for inter-service communication
//! - The resource planner and the reconciliation diff
//!
//! Nothing in here performs I/O; persistence lives in the orchestrator and
//! execution against external systems in the runner.

pub mod domain;
pub mod dto;
pub mod error;
pub mod planner;
pub mod reconciler;

pub use planner::plan;
pub use reconciler::reconcile;
