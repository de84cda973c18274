//! Stack Repository
//!
//! Handles all database operations related to stacks.

use ferry_core::domain::stack::Stack;
use ferry_core::domain::state::DesiredState;
use ferry_core::dto::stack::CreateStack;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// Create a new stack in the database
pub async fn create(pool: &PgPool, req: CreateStack) -> Result<Stack, sqlx::Error> {
    let now = chrono::Utc::now();

    let stack = Stack {
        id: Uuid::new_v4(),
        name: req.desired.name.clone(),
        desired: req.desired,
        auto_reconcile: req.auto_reconcile,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO stacks (id, name, desired, auto_reconcile, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(stack.id)
    .bind(&stack.name)
    .bind(Json(&stack.desired))
    .bind(stack.auto_reconcile)
    .bind(stack.created_at)
    .bind(stack.updated_at)
    .execute(pool)
    .await?;

    Ok(stack)
}

/// Find a stack by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Stack>, sqlx::Error> {
    let row = sqlx::query_as::<_, StackRow>(
        r#"
        SELECT id, name, desired, auto_reconcile, created_at, updated_at
        FROM stacks
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find a stack by its desired state name
pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Stack>, sqlx::Error> {
    let row = sqlx::query_as::<_, StackRow>(
        r#"
        SELECT id, name, desired, auto_reconcile, created_at, updated_at
        FROM stacks
        WHERE name = $1
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List all stacks
pub async fn list_all(pool: &PgPool) -> Result<Vec<Stack>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StackRow>(
        r#"
        SELECT id, name, desired, auto_reconcile, created_at, updated_at
        FROM stacks
        ORDER BY name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Stacks that want periodic reconciliation and have no queued or running
/// deployment
pub async fn find_idle_auto_reconcile(pool: &PgPool) -> Result<Vec<Stack>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StackRow>(
        r#"
        SELECT s.id, s.name, s.desired, s.auto_reconcile, s.created_at, s.updated_at
        FROM stacks s
        WHERE s.auto_reconcile
          AND NOT EXISTS (
              SELECT 1 FROM deployments d
              WHERE d.stack_id = s.id AND d.status IN ('Queued', 'Running')
          )
        ORDER BY s.name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Replace the desired state of a stack
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    desired: &DesiredState,
    auto_reconcile: bool,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE stacks
        SET name = $1, desired = $2, auto_reconcile = $3, updated_at = $4
        WHERE id = $5
        "#,
    )
    .bind(&desired.name)
    .bind(Json(desired))
    .bind(auto_reconcile)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a stack by ID
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM stacks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct StackRow {
    id: Uuid,
    name: String,
    desired: Json<DesiredState>,
    auto_reconcile: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<StackRow> for Stack {
    fn from(row: StackRow) -> Self {
        Stack {
            id: row.id,
            name: row.name,
            desired: row.desired.0,
            auto_reconcile: row.auto_reconcile,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
