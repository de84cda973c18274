//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used for communication between Ferry services
//! (orchestrator, runner, CLI). DTOs are lightweight request and response
//! shapes built around the domain types.

pub mod deployment;
pub mod pipeline;
pub mod stack;
