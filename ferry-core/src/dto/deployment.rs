//! Deployment DTOs
//!
//! Shapes exchanged while a deployment moves from queued to finished:
//! launched by the CLI, claimed and reported on by a runner.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::deployment::{DeploymentMode, DeploymentStatus};
use crate::domain::operation::Operation;
use crate::domain::run_log::RunLogEntry;
use crate::domain::state::DesiredState;

/// Request to queue a deployment for a stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeployment {
    pub stack_id: Uuid,
    pub mode: DeploymentMode,
}

/// Request from a runner to claim a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteDeploymentRequest {
    pub runner_id: String,
}

/// Everything a runner needs to execute a claimed deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentExecutionInfo {
    pub deployment_id: Uuid,
    pub stack_id: Uuid,
    pub mode: DeploymentMode,
    pub desired: DesiredState,

    /// Planned operations (empty for reconcile; the runner computes them)
    pub operations: Vec<Operation>,
}

/// Operations a runner computed for a reconcile deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOperations {
    pub operations: Vec<Operation>,
}

/// Run-log entries sent from runner to orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogBatch {
    pub deployment_id: Uuid,
    pub entries: Vec<RunLogEntry>,
}

/// Final status reported by the runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteDeployment {
    pub status: DeploymentStatus,

    #[serde(default)]
    pub error: Option<String>,
}
