//! Pipeline Run Repository
//!
//! Handles all database operations related to pipeline runs.

use ferry_core::domain::pipeline::{PipelineRun, PipelineStatus, StageRecord};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

const COLUMNS: &str =
    "id, stack_id, service, status, tag, stages, image, error, runner_id, created_at, updated_at";

/// Insert a freshly created run
pub async fn create(pool: &PgPool, run: &PipelineRun) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO pipeline_runs (
            id, stack_id, service, status, tag, stages, image, error,
            runner_id, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(run.id)
    .bind(run.stack_id)
    .bind(&run.service)
    .bind(status_to_string(run.status))
    .bind(&run.tag)
    .bind(Json(&run.stages))
    .bind(&run.image)
    .bind(&run.error)
    .bind(&run.runner_id)
    .bind(run.created_at)
    .bind(run.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a run by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<PipelineRun>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {COLUMNS} FROM pipeline_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Runs of a stack, newest first
pub async fn find_by_stack(pool: &PgPool, stack_id: Uuid) -> Result<Vec<PipelineRun>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {COLUMNS} FROM pipeline_runs WHERE stack_id = $1 ORDER BY created_at DESC"
    ))
    .bind(stack_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Pending runs no runner has claimed yet, oldest first
pub async fn find_unclaimed(pool: &PgPool) -> Result<Vec<PipelineRun>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {COLUMNS} FROM pipeline_runs \
         WHERE status = $1 AND runner_id IS NULL \
         ORDER BY created_at ASC"
    ))
    .bind(status_to_string(PipelineStatus::Pending))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// The non-terminal run of a service, if one exists
pub async fn find_active(
    pool: &PgPool,
    stack_id: Uuid,
    service: &str,
) -> Result<Option<PipelineRun>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRunRow>(&format!(
        "SELECT {COLUMNS} FROM pipeline_runs \
         WHERE stack_id = $1 AND service = $2 AND status NOT IN ('Succeeded', 'Failed') \
         ORDER BY created_at DESC \
         LIMIT 1"
    ))
    .bind(stack_id)
    .bind(service)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Assign an unclaimed pending run to a runner
///
/// Returns false when another runner got there first.
pub async fn claim(pool: &PgPool, id: Uuid, runner_id: &str) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE pipeline_runs
        SET runner_id = $1, updated_at = $2
        WHERE id = $3 AND status = $4 AND runner_id IS NULL
        "#,
    )
    .bind(runner_id)
    .bind(now)
    .bind(id)
    .bind(status_to_string(PipelineStatus::Pending))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Store the mutable part of a run reported by a runner
pub async fn update_progress(pool: &PgPool, run: &PipelineRun) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE pipeline_runs
        SET status = $1, stages = $2, image = $3, error = $4, updated_at = $5
        WHERE id = $6
        "#,
    )
    .bind(status_to_string(run.status))
    .bind(Json(&run.stages))
    .bind(&run.image)
    .bind(&run.error)
    .bind(run.updated_at)
    .bind(run.id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: PipelineStatus) -> &'static str {
    match status {
        PipelineStatus::Pending => "Pending",
        PipelineStatus::Building => "Building",
        PipelineStatus::Pushing => "Pushing",
        PipelineStatus::Deploying => "Deploying",
        PipelineStatus::Succeeded => "Succeeded",
        PipelineStatus::Failed => "Failed",
    }
}

fn string_to_status(s: &str) -> PipelineStatus {
    match s {
        "Pending" => PipelineStatus::Pending,
        "Building" => PipelineStatus::Building,
        "Pushing" => PipelineStatus::Pushing,
        "Deploying" => PipelineStatus::Deploying,
        "Succeeded" => PipelineStatus::Succeeded,
        "Failed" => PipelineStatus::Failed,
        other => {
            tracing::warn!("Unknown pipeline status '{}' in database", other);
            PipelineStatus::Failed
        }
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRunRow {
    id: Uuid,
    stack_id: Uuid,
    service: String,
    status: String,
    tag: String,
    stages: Json<Vec<StageRecord>>,
    image: Option<String>,
    error: Option<String>,
    runner_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<PipelineRunRow> for PipelineRun {
    fn from(row: PipelineRunRow) -> Self {
        PipelineRun {
            id: row.id,
            stack_id: row.stack_id,
            service: row.service,
            status: string_to_status(&row.status),
            tag: row.tag,
            stages: row.stages.0,
            image: row.image,
            error: row.error,
            runner_id: row.runner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
