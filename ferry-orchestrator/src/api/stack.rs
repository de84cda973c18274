//! Stack API Handlers
//!
//! HTTP endpoints for desired-state registration and planning.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use ferry_core::domain::operation::Operation;
use ferry_core::domain::stack::Stack;
use ferry_core::dto::stack::{CreateStack, StackSummary, UpdateStack};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::stack_service;

/// POST /stack/create
/// Register a new desired state
pub async fn create_stack(
    State(pool): State<PgPool>,
    Json(req): Json<CreateStack>,
) -> ApiResult<(StatusCode, Json<Stack>)> {
    tracing::info!("Creating stack: {}", req.desired.name);

    let stack = stack_service::create_stack(&pool, req).await?;

    Ok((StatusCode::CREATED, Json(stack)))
}

/// GET /stack/list
/// List all stacks
pub async fn list_stacks(State(pool): State<PgPool>) -> ApiResult<Json<Vec<StackSummary>>> {
    tracing::debug!("Listing all stacks");

    let stacks = stack_service::list_stacks(&pool).await?;

    Ok(Json(stacks))
}

/// GET /stack/{id}
/// Get stack by ID
pub async fn get_stack(State(pool): State<PgPool>, Path(id): Path<Uuid>) -> ApiResult<Json<Stack>> {
    tracing::debug!("Getting stack: {}", id);

    let stack = stack_service::get_stack(&pool, id).await?;

    Ok(Json(stack))
}

/// PUT /stack/{id}
/// Replace the desired state of a stack
pub async fn update_stack(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStack>,
) -> ApiResult<Json<Stack>> {
    tracing::info!("Updating stack: {}", id);

    let stack = stack_service::update_stack(&pool, id, req).await?;

    Ok(Json(stack))
}

/// DELETE /stack/{id}
/// Delete a stack
pub async fn delete_stack(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting stack: {}", id);

    stack_service::delete_stack(&pool, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /stack/{id}/plan
/// Ordered operations bringing an empty environment to the stack
pub async fn plan_stack(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Operation>>> {
    tracing::debug!("Planning stack: {}", id);

    let operations = stack_service::plan_stack(&pool, id).await?;

    Ok(Json(operations))
}
