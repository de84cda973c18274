//! Core domain types
//!
//! This module contains the core domain structures used across Ferry services.
//! These types represent the fundamental business entities and are shared between
//! orchestrator (for persistence) and runner (for execution).

pub mod deployment;
pub mod operation;
pub mod pipeline;
pub mod resource;
pub mod run_log;
pub mod stack;
pub mod state;
