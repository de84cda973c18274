//! Pipeline Run API Handlers
//!
//! HTTP endpoints for per-service delivery runs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use ferry_core::domain::pipeline::PipelineRun;
use ferry_core::dto::pipeline::{
    CreatePipelineRun, ExecutePipelineRunRequest, PipelineRunExecutionInfo,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::pipeline_run_service;

/// POST /pipeline-run/launch
/// Queue a pipeline run for one service
pub async fn launch_pipeline_run(
    State(pool): State<PgPool>,
    Json(req): Json<CreatePipelineRun>,
) -> ApiResult<(StatusCode, Json<PipelineRun>)> {
    tracing::info!(
        "Launching pipeline run for service {} of stack {}",
        req.service,
        req.stack_id
    );

    let run = pipeline_run_service::launch_pipeline_run(&pool, req).await?;

    Ok((StatusCode::CREATED, Json(run)))
}

/// GET /pipeline-run/{id}
/// Get pipeline run details by ID
pub async fn get_pipeline_run(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::debug!("Getting pipeline run: {}", id);

    let run = pipeline_run_service::get_pipeline_run(&pool, id).await?;

    Ok(Json(run))
}

/// GET /pipeline-run/list/scheduled
/// List pending runs waiting for a runner
pub async fn list_scheduled_pipeline_runs(
    State(pool): State<PgPool>,
) -> ApiResult<Json<Vec<PipelineRun>>> {
    tracing::debug!("Listing scheduled pipeline runs");

    let runs = pipeline_run_service::list_scheduled_pipeline_runs(&pool).await?;

    Ok(Json(runs))
}

/// GET /pipeline-run/stack/{stack_id}
/// List all pipeline runs of a stack
pub async fn list_pipeline_runs_by_stack(
    State(pool): State<PgPool>,
    Path(stack_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PipelineRun>>> {
    tracing::debug!("Listing pipeline runs for stack: {}", stack_id);

    let runs = pipeline_run_service::list_pipeline_runs_by_stack(&pool, stack_id).await?;

    Ok(Json(runs))
}

/// POST /pipeline-run/execute/{id}
/// Reserve a pipeline run for a runner
pub async fn execute_pipeline_run(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<ExecutePipelineRunRequest>,
) -> ApiResult<Json<PipelineRunExecutionInfo>> {
    tracing::info!("Runner {} executing pipeline run: {}", req.runner_id, id);

    let info =
        pipeline_run_service::reserve_pipeline_run_for_execution(&pool, id, req.runner_id).await?;

    Ok(Json(info))
}

/// PUT /pipeline-run/{id}
/// Store the run record after a stage transition
pub async fn report_pipeline_run(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(run): Json<PipelineRun>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::debug!("Pipeline run {} reported status {}", id, run.status);

    let run = pipeline_run_service::report_pipeline_run(&pool, id, run).await?;

    Ok(Json(run))
}
