//! Run Log Repository
//!
//! Append-only storage of run-log entries per deployment.

use ferry_core::domain::run_log::RunLogEntry;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// Append entries for a deployment, keeping their order
pub async fn add_entries(
    pool: &PgPool,
    deployment_id: Uuid,
    entries: &[RunLogEntry],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO run_log_entries (deployment_id, operation_id, status, timestamp, entry)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(deployment_id)
        .bind(&entry.operation_id)
        .bind(entry.status.to_string())
        .bind(entry.timestamp)
        .bind(Json(entry))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// All entries of a deployment in arrival order
pub async fn find_by_deployment(
    pool: &PgPool,
    deployment_id: Uuid,
) -> Result<Vec<RunLogEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunLogRow>(
        r#"
        SELECT entry
        FROM run_log_entries
        WHERE deployment_id = $1
        ORDER BY seq ASC
        "#,
    )
    .bind(deployment_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.entry.0).collect())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunLogRow {
    entry: Json<RunLogEntry>,
}
