//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod deployment;
pub mod error;
pub mod health;
pub mod pipeline_run;
pub mod stack;

use axum::{
    Router,
    routing::{get, post, put},
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

/// Create the main API router with all endpoints
pub fn create_router(pool: PgPool) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Stack endpoints
        .route("/stack/create", post(stack::create_stack))
        .route("/stack/list", get(stack::list_stacks))
        .route(
            "/stack/{id}",
            get(stack::get_stack)
                .put(stack::update_stack)
                .delete(stack::delete_stack),
        )
        .route("/stack/{id}/plan", get(stack::plan_stack))
        // Deployment endpoints
        .route("/deployment/launch", post(deployment::launch_deployment))
        .route(
            "/deployment/list/scheduled",
            get(deployment::list_scheduled_deployments),
        )
        .route(
            "/deployment/stack/{stack_id}",
            get(deployment::list_deployments_by_stack),
        )
        .route("/deployment/execute/{id}", post(deployment::execute_deployment))
        .route("/deployment/{id}", get(deployment::get_deployment))
        .route("/deployment/{id}/operations", put(deployment::record_operations))
        .route(
            "/deployment/{id}/run-log",
            get(deployment::get_run_log).post(deployment::add_run_log),
        )
        .route("/deployment/{id}/complete", post(deployment::complete_deployment))
        .route("/deployment/{id}/cancel", post(deployment::cancel_deployment))
        // Pipeline run endpoints
        .route("/pipeline-run/launch", post(pipeline_run::launch_pipeline_run))
        .route(
            "/pipeline-run/list/scheduled",
            get(pipeline_run::list_scheduled_pipeline_runs),
        )
        .route(
            "/pipeline-run/stack/{stack_id}",
            get(pipeline_run::list_pipeline_runs_by_stack),
        )
        .route(
            "/pipeline-run/execute/{id}",
            post(pipeline_run::execute_pipeline_run),
        )
        .route(
            "/pipeline-run/{id}",
            get(pipeline_run::get_pipeline_run).put(pipeline_run::report_pipeline_run),
        )
        // Add state and middleware
        .with_state(pool)
        .layer(TraceLayer::new_for_http())
}
