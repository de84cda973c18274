//! Scheduler layer for the runner
//!
//! Polls the orchestrator for queued deployments and pending pipeline
//! runs, and manages each claimed item from claim to completion report.

pub mod poller;

pub use poller::Poller;
