//! Pipeline run DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::PipelineRun;
use crate::domain::state::DesiredState;

/// Request to queue a pipeline run for one service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipelineRun {
    pub stack_id: Uuid,
    pub service: String,

    /// Image tag; defaults to a prefix of the run id
    #[serde(default)]
    pub tag: Option<String>,
}

/// Request from a runner to claim a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutePipelineRunRequest {
    pub runner_id: String,
}

/// Everything a runner needs to drive a claimed pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunExecutionInfo {
    pub run: PipelineRun,
    pub desired: DesiredState,
}
