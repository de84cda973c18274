//! Deployment Repository
//!
//! Handles all database operations related to deployments.

use ferry_core::domain::deployment::{Deployment, DeploymentMode, DeploymentStatus};
use ferry_core::domain::operation::Operation;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

const COLUMNS: &str = "id, stack_id, mode, status, operations, requested_at, started_at, \
                       completed_at, runner_id, error";

/// Create a new queued deployment
pub async fn create(
    pool: &PgPool,
    stack_id: Uuid,
    mode: DeploymentMode,
    operations: Vec<Operation>,
) -> Result<Deployment, sqlx::Error> {
    let deployment = Deployment {
        id: Uuid::new_v4(),
        stack_id,
        mode,
        status: DeploymentStatus::Queued,
        operations,
        requested_at: chrono::Utc::now(),
        started_at: None,
        completed_at: None,
        runner_id: None,
        error: None,
    };

    sqlx::query(
        r#"
        INSERT INTO deployments (id, stack_id, mode, status, operations, requested_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(deployment.id)
    .bind(stack_id)
    .bind(Json(mode))
    .bind(status_to_string(DeploymentStatus::Queued))
    .bind(Json(&deployment.operations))
    .bind(deployment.requested_at)
    .execute(pool)
    .await?;

    Ok(deployment)
}

/// Find a deployment by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Deployment>, sqlx::Error> {
    let row = sqlx::query_as::<_, DeploymentRow>(&format!(
        "SELECT {COLUMNS} FROM deployments WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find deployments by status, oldest first
pub async fn find_by_status(
    pool: &PgPool,
    status: DeploymentStatus,
) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
        "SELECT {COLUMNS} FROM deployments WHERE status = $1 ORDER BY requested_at ASC"
    ))
    .bind(status_to_string(status))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Find deployments of a stack, newest first
pub async fn find_by_stack(pool: &PgPool, stack_id: Uuid) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
        "SELECT {COLUMNS} FROM deployments WHERE stack_id = $1 ORDER BY requested_at DESC"
    ))
    .bind(stack_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Whether the stack has a queued or running deployment
pub async fn has_active(pool: &PgPool, stack_id: Uuid) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM deployments
            WHERE stack_id = $1 AND status IN ('Queued', 'Running')
        )
        "#,
    )
    .bind(stack_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Move a queued deployment to Running for a runner
///
/// Returns false when the deployment was not queued anymore, so two runners
/// can never claim the same deployment.
pub async fn claim(pool: &PgPool, id: Uuid, runner_id: &str) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE deployments
        SET status = $1, started_at = $2, runner_id = $3
        WHERE id = $4 AND status = $5
        "#,
    )
    .bind(status_to_string(DeploymentStatus::Running))
    .bind(now)
    .bind(runner_id)
    .bind(id)
    .bind(status_to_string(DeploymentStatus::Queued))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Replace the recorded operations of a deployment
pub async fn update_operations(
    pool: &PgPool,
    id: Uuid,
    operations: &[Operation],
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE deployments SET operations = $1 WHERE id = $2")
        .bind(Json(operations))
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Update deployment status to a completed state
pub async fn update_status_to_completed(
    pool: &PgPool,
    id: Uuid,
    status: DeploymentStatus,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        UPDATE deployments
        SET status = $1, completed_at = $2, error = $3
        WHERE id = $4
        "#,
    )
    .bind(status_to_string(status))
    .bind(now)
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: DeploymentStatus) -> &'static str {
    match status {
        DeploymentStatus::Queued => "Queued",
        DeploymentStatus::Running => "Running",
        DeploymentStatus::Succeeded => "Succeeded",
        DeploymentStatus::Failed => "Failed",
        DeploymentStatus::Cancelled => "Cancelled",
    }
}

fn string_to_status(s: &str) -> DeploymentStatus {
    match s {
        "Queued" => DeploymentStatus::Queued,
        "Running" => DeploymentStatus::Running,
        "Succeeded" => DeploymentStatus::Succeeded,
        "Failed" => DeploymentStatus::Failed,
        "Cancelled" => DeploymentStatus::Cancelled,
        other => {
            tracing::warn!("Unknown deployment status '{}' in database", other);
            DeploymentStatus::Failed
        }
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: Uuid,
    stack_id: Uuid,
    mode: Json<DeploymentMode>,
    status: String,
    operations: Json<Vec<Operation>>,
    requested_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    runner_id: Option<String>,
    error: Option<String>,
}

impl From<DeploymentRow> for Deployment {
    fn from(row: DeploymentRow) -> Self {
        Deployment {
            id: row.id,
            stack_id: row.stack_id,
            mode: row.mode.0,
            status: string_to_status(&row.status),
            operations: row.operations.0,
            requested_at: row.requested_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            runner_id: row.runner_id,
            error: row.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_reads_as_failed() {
        assert_eq!(string_to_status("Exploded"), DeploymentStatus::Failed);
        assert_eq!(
            string_to_status(status_to_string(DeploymentStatus::Cancelled)),
            DeploymentStatus::Cancelled
        );
    }
}
