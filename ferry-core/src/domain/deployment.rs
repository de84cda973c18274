//! Deployment domain types
//!
//! A deployment is one queued unit of convergence work for a stack: either
//! applying the planned operations or reconciling against live state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::operation::Operation;

/// Deployment execution record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub stack_id: Uuid,
    pub mode: DeploymentMode,
    pub status: DeploymentStatus,

    /// Planned operations for `Apply`, computed operations for `Reconcile`
    pub operations: Vec<Operation>,

    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub runner_id: Option<String>,
    pub error: Option<String>,
}

/// What a deployment does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeploymentMode {
    /// Apply every planned operation
    Apply,

    /// Observe live state and apply the corrective operations
    Reconcile {
        /// Only compute the corrective operations
        #[serde(default)]
        dry_run: bool,
    },
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentMode::Apply => write!(f, "apply"),
            DeploymentMode::Reconcile { dry_run: false } => write!(f, "reconcile"),
            DeploymentMode::Reconcile { dry_run: true } => write!(f, "reconcile (dry run)"),
        }
    }
}

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    pub fn is_active(self) -> bool {
        matches!(self, DeploymentStatus::Queued | DeploymentStatus::Running)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentStatus::Queued => write!(f, "Queued"),
            DeploymentStatus::Running => write!(f, "Running"),
            DeploymentStatus::Succeeded => write!(f, "Succeeded"),
            DeploymentStatus::Failed => write!(f, "Failed"),
            DeploymentStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serializes_with_tag() {
        let json = serde_json::to_value(DeploymentMode::Reconcile { dry_run: true }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Reconcile", "dry_run": true }));

        let mode: DeploymentMode = serde_json::from_str(r#"{ "type": "Reconcile" }"#).unwrap();
        assert_eq!(mode, DeploymentMode::Reconcile { dry_run: false });
    }

    #[test]
    fn test_active_statuses() {
        assert!(DeploymentStatus::Queued.is_active());
        assert!(DeploymentStatus::Running.is_active());
        assert!(!DeploymentStatus::Succeeded.is_active());
        assert!(!DeploymentStatus::Cancelled.is_active());
    }
}
