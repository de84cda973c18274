//! Deployment Service
//!
//! Business logic for queued convergence work and its run logs.

use ferry_core::domain::deployment::{Deployment, DeploymentMode, DeploymentStatus};
use ferry_core::domain::operation::Operation;
use ferry_core::domain::run_log::RunLogEntry;
use ferry_core::dto::deployment::{
    CompleteDeployment, CreateDeployment, DeploymentExecutionInfo, RunLogBatch,
};
use ferry_core::planner;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{deployment_repository, run_log_repository, stack_repository};

/// Service error type
#[derive(Debug)]
pub enum DeploymentError {
    NotFound(Uuid),
    StackNotFound(Uuid),
    Conflict(String),
    InvalidState(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for DeploymentError {
    fn from(err: sqlx::Error) -> Self {
        DeploymentError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, DeploymentError>;

/// Queue an Apply or Reconcile for a stack
///
/// Apply deployments carry the plan computed at launch time. Reconcile
/// deployments start empty; the runner records the operations it computes
/// against live state. A stack runs at most one deployment at a time.
pub async fn launch_deployment(pool: &PgPool, req: CreateDeployment) -> Result<Deployment> {
    let stack = stack_repository::find_by_id(pool, req.stack_id)
        .await?
        .ok_or(DeploymentError::StackNotFound(req.stack_id))?;

    ensure_idle(&stack.name, deployment_repository::has_active(pool, stack.id).await?)?;

    let operations = match req.mode {
        DeploymentMode::Apply => planner::plan(&stack.desired)
            .map_err(|e| DeploymentError::ValidationError(e.to_string()))?,
        DeploymentMode::Reconcile { .. } => Vec::new(),
    };

    let deployment =
        deployment_repository::create(pool, stack.id, req.mode, operations).await?;

    tracing::info!(
        "Deployment {} queued for stack {} ({}, {} operations)",
        deployment.id,
        stack.name,
        deployment.mode,
        deployment.operations.len()
    );

    Ok(deployment)
}

/// Get a deployment by ID
pub async fn get_deployment(pool: &PgPool, id: Uuid) -> Result<Deployment> {
    deployment_repository::find_by_id(pool, id)
        .await?
        .ok_or(DeploymentError::NotFound(id))
}

/// List deployments by status
pub async fn list_deployments_by_status(
    pool: &PgPool,
    status: DeploymentStatus,
) -> Result<Vec<Deployment>> {
    let deployments = deployment_repository::find_by_status(pool, status).await?;
    Ok(deployments)
}

/// List deployments of a stack
pub async fn list_deployments_by_stack(pool: &PgPool, stack_id: Uuid) -> Result<Vec<Deployment>> {
    // Verify stack exists
    let _stack = stack_repository::find_by_id(pool, stack_id)
        .await?
        .ok_or(DeploymentError::StackNotFound(stack_id))?;

    let deployments = deployment_repository::find_by_stack(pool, stack_id).await?;
    Ok(deployments)
}

/// Reserve a queued deployment for a runner
pub async fn reserve_deployment_for_execution(
    pool: &PgPool,
    id: Uuid,
    runner_id: String,
) -> Result<DeploymentExecutionInfo> {
    if runner_id.trim().is_empty() {
        return Err(DeploymentError::ValidationError(
            "runner_id cannot be empty".to_string(),
        ));
    }

    let deployment = get_deployment(pool, id).await?;

    let stack = stack_repository::find_by_id(pool, deployment.stack_id)
        .await?
        .ok_or(DeploymentError::StackNotFound(deployment.stack_id))?;

    if !deployment_repository::claim(pool, id, &runner_id).await? {
        let current = get_deployment(pool, id).await?;
        return Err(DeploymentError::InvalidState(format!(
            "Deployment {} is not in Queued state (current: {})",
            id, current.status
        )));
    }

    tracing::info!("Deployment {} reserved by runner {}", id, runner_id);

    Ok(DeploymentExecutionInfo {
        deployment_id: deployment.id,
        stack_id: stack.id,
        mode: deployment.mode,
        desired: stack.desired,
        operations: deployment.operations,
    })
}

/// Record the operations a runner computed for a running deployment
pub async fn record_operations(pool: &PgPool, id: Uuid, operations: Vec<Operation>) -> Result<()> {
    let deployment = get_deployment(pool, id).await?;
    ensure_running(&deployment)?;

    deployment_repository::update_operations(pool, id, &operations).await?;

    tracing::info!(
        "Deployment {} recorded {} operations",
        id,
        operations.len()
    );

    Ok(())
}

/// Append run-log entries for a deployment
pub async fn add_run_log_entries(pool: &PgPool, id: Uuid, batch: RunLogBatch) -> Result<()> {
    if batch.deployment_id != id {
        return Err(DeploymentError::ValidationError(format!(
            "Run log batch is for deployment {}, not {}",
            batch.deployment_id, id
        )));
    }

    // Verify deployment exists
    let _deployment = get_deployment(pool, id).await?;

    if batch.entries.is_empty() {
        return Ok(());
    }

    run_log_repository::add_entries(pool, id, &batch.entries).await?;

    tracing::debug!("Stored {} run log entries for deployment {}", batch.entries.len(), id);

    Ok(())
}

/// All run-log entries of a deployment in arrival order
pub async fn get_run_log(pool: &PgPool, id: Uuid) -> Result<Vec<RunLogEntry>> {
    let _deployment = get_deployment(pool, id).await?;

    let entries = run_log_repository::find_by_deployment(pool, id).await?;
    Ok(entries)
}

/// Complete a deployment with final status
pub async fn complete_deployment(pool: &PgPool, id: Uuid, req: CompleteDeployment) -> Result<()> {
    validate_completion_status(req.status)?;

    let deployment = get_deployment(pool, id).await?;

    if !deployment.status.is_active() {
        return Err(DeploymentError::InvalidState(format!(
            "Deployment {} already finished with status {}",
            id, deployment.status
        )));
    }

    if deployment.status != DeploymentStatus::Running {
        tracing::warn!(
            "Completing deployment {} that is not in Running state (current: {})",
            id,
            deployment.status
        );
    }

    deployment_repository::update_status_to_completed(pool, id, req.status, req.error.as_deref())
        .await?;

    match req.status {
        DeploymentStatus::Failed => tracing::error!(
            "Deployment {} failed: {}",
            id,
            req.error.as_deref().unwrap_or("no details")
        ),
        status => tracing::info!("Deployment {} completed with status: {}", id, status),
    }

    Ok(())
}

/// Cancel a deployment no runner has claimed yet
pub async fn cancel_deployment(pool: &PgPool, id: Uuid) -> Result<()> {
    let deployment = get_deployment(pool, id).await?;

    if deployment.status != DeploymentStatus::Queued {
        return Err(DeploymentError::InvalidState(format!(
            "Cannot cancel deployment {} in state {}",
            id, deployment.status
        )));
    }

    deployment_repository::update_status_to_completed(pool, id, DeploymentStatus::Cancelled, None)
        .await?;

    tracing::info!("Deployment {} cancelled", id);

    Ok(())
}

/// Queue a reconcile for every idle stack that asked for periodic
/// reconciliation; returns how many were queued
pub async fn enqueue_periodic_reconciliations(pool: &PgPool) -> Result<usize> {
    let stacks = stack_repository::find_idle_auto_reconcile(pool).await?;

    for stack in &stacks {
        let deployment = deployment_repository::create(
            pool,
            stack.id,
            DeploymentMode::Reconcile { dry_run: false },
            Vec::new(),
        )
        .await?;

        tracing::debug!(
            "Periodic reconcile {} queued for stack {}",
            deployment.id,
            stack.name
        );
    }

    Ok(stacks.len())
}

// =============================================================================
// Validation
// =============================================================================

fn validate_completion_status(status: DeploymentStatus) -> Result<()> {
    match status {
        DeploymentStatus::Succeeded | DeploymentStatus::Failed | DeploymentStatus::Cancelled => {
            Ok(())
        }
        _ => Err(DeploymentError::ValidationError(format!(
            "Invalid completion status: {}",
            status
        ))),
    }
}

fn ensure_idle(stack: &str, has_active: bool) -> Result<()> {
    if has_active {
        return Err(DeploymentError::Conflict(format!(
            "Stack '{}' already has a queued or running deployment",
            stack
        )));
    }
    Ok(())
}

fn ensure_running(deployment: &Deployment) -> Result<()> {
    if deployment.status != DeploymentStatus::Running {
        return Err(DeploymentError::InvalidState(format!(
            "Deployment {} is not running (current: {})",
            deployment.id, deployment.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(status: DeploymentStatus) -> Deployment {
        Deployment {
            id: Uuid::new_v4(),
            stack_id: Uuid::new_v4(),
            mode: DeploymentMode::Reconcile { dry_run: false },
            status,
            operations: Vec::new(),
            requested_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            runner_id: None,
            error: None,
        }
    }

    #[test]
    fn test_validate_completion_status_valid() {
        assert!(validate_completion_status(DeploymentStatus::Succeeded).is_ok());
        assert!(validate_completion_status(DeploymentStatus::Failed).is_ok());
        assert!(validate_completion_status(DeploymentStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_validate_completion_status_invalid() {
        assert!(validate_completion_status(DeploymentStatus::Queued).is_err());
        assert!(validate_completion_status(DeploymentStatus::Running).is_err());
    }

    #[test]
    fn test_launch_conflicts_with_active_deployment() {
        assert!(ensure_idle("shop", false).is_ok());
        assert!(matches!(
            ensure_idle("shop", true),
            Err(DeploymentError::Conflict(msg)) if msg.contains("shop")
        ));
    }

    #[test]
    fn test_operations_are_recorded_only_while_running() {
        assert!(ensure_running(&deployment(DeploymentStatus::Running)).is_ok());
        assert!(matches!(
            ensure_running(&deployment(DeploymentStatus::Queued)),
            Err(DeploymentError::InvalidState(_))
        ));
        assert!(matches!(
            ensure_running(&deployment(DeploymentStatus::Succeeded)),
            Err(DeploymentError::InvalidState(_))
        ));
    }
}
