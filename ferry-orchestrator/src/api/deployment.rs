//! Deployment API Handlers
//!
//! HTTP endpoints for deployment lifecycle and run logs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use ferry_core::domain::deployment::{Deployment, DeploymentStatus};
use ferry_core::domain::run_log::RunLogEntry;
use ferry_core::dto::deployment::{
    CompleteDeployment, CreateDeployment, DeploymentExecutionInfo, ExecuteDeploymentRequest,
    RecordOperations, RunLogBatch,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::deployment_service;

// =============================================================================
// Deployment Lifecycle Endpoints
// =============================================================================

/// POST /deployment/launch
/// Queue an Apply or Reconcile for a stack
pub async fn launch_deployment(
    State(pool): State<PgPool>,
    Json(req): Json<CreateDeployment>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    tracing::info!("Launching {} for stack: {}", req.mode, req.stack_id);

    let deployment = deployment_service::launch_deployment(&pool, req).await?;

    Ok((StatusCode::CREATED, Json(deployment)))
}

/// GET /deployment/{id}
/// Get deployment details by ID
pub async fn get_deployment(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    tracing::debug!("Getting deployment: {}", id);

    let deployment = deployment_service::get_deployment(&pool, id).await?;

    Ok(Json(deployment))
}

/// GET /deployment/list/scheduled
/// List all queued deployments
pub async fn list_scheduled_deployments(
    State(pool): State<PgPool>,
) -> ApiResult<Json<Vec<Deployment>>> {
    tracing::debug!("Listing scheduled deployments");

    let deployments =
        deployment_service::list_deployments_by_status(&pool, DeploymentStatus::Queued).await?;

    Ok(Json(deployments))
}

/// GET /deployment/stack/{stack_id}
/// List all deployments of a stack
pub async fn list_deployments_by_stack(
    State(pool): State<PgPool>,
    Path(stack_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Deployment>>> {
    tracing::debug!("Listing deployments for stack: {}", stack_id);

    let deployments = deployment_service::list_deployments_by_stack(&pool, stack_id).await?;

    Ok(Json(deployments))
}

/// POST /deployment/execute/{id}
/// Reserve a deployment for execution by a runner
pub async fn execute_deployment(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<ExecuteDeploymentRequest>,
) -> ApiResult<Json<DeploymentExecutionInfo>> {
    tracing::info!("Runner {} executing deployment: {}", req.runner_id, id);

    let info =
        deployment_service::reserve_deployment_for_execution(&pool, id, req.runner_id).await?;

    Ok(Json(info))
}

/// PUT /deployment/{id}/operations
/// Record the operations a runner computed
pub async fn record_operations(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<RecordOperations>,
) -> ApiResult<StatusCode> {
    tracing::debug!(
        "Recording {} operations for deployment: {}",
        req.operations.len(),
        id
    );

    deployment_service::record_operations(&pool, id, req.operations).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /deployment/{id}/complete
/// Mark a deployment as complete with final status
pub async fn complete_deployment(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteDeployment>,
) -> ApiResult<StatusCode> {
    tracing::info!("Completing deployment: {} with status {}", id, req.status);

    deployment_service::complete_deployment(&pool, id, req).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /deployment/{id}/cancel
/// Cancel a queued deployment
pub async fn cancel_deployment(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Cancelling deployment: {}", id);

    deployment_service::cancel_deployment(&pool, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Run Log Endpoints
// =============================================================================

/// GET /deployment/{id}/run-log
/// Get all run-log entries of a deployment
pub async fn get_run_log(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<RunLogEntry>>> {
    tracing::debug!("Getting run log for deployment: {}", id);

    let entries = deployment_service::get_run_log(&pool, id).await?;

    Ok(Json(entries))
}

/// POST /deployment/{id}/run-log
/// Append run-log entries to a deployment
pub async fn add_run_log(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(batch): Json<RunLogBatch>,
) -> ApiResult<StatusCode> {
    tracing::debug!(
        "Adding {} run log entries for deployment: {}",
        batch.entries.len(),
        id
    );

    deployment_service::add_run_log_entries(&pool, id, batch).await?;

    Ok(StatusCode::CREATED)
}
