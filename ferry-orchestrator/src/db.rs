use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create stacks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stacks (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            desired JSONB NOT NULL,
            auto_reconcile BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create deployments table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployments (
            id UUID PRIMARY KEY,
            stack_id UUID NOT NULL REFERENCES stacks(id) ON DELETE CASCADE,
            mode JSONB NOT NULL,
            status VARCHAR(50) NOT NULL,
            operations JSONB NOT NULL DEFAULT '[]',
            requested_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            runner_id VARCHAR(255),
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only run log; seq keeps arrival order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_log_entries (
            seq BIGSERIAL PRIMARY KEY,
            deployment_id UUID NOT NULL REFERENCES deployments(id) ON DELETE CASCADE,
            operation_id VARCHAR(255) NOT NULL,
            status VARCHAR(50) NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL,
            entry JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create pipeline runs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id UUID PRIMARY KEY,
            stack_id UUID NOT NULL REFERENCES stacks(id) ON DELETE CASCADE,
            service VARCHAR(255) NOT NULL,
            status VARCHAR(50) NOT NULL,
            tag VARCHAR(255) NOT NULL,
            stages JSONB NOT NULL,
            image TEXT,
            error TEXT,
            runner_id VARCHAR(255),
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deployments_status ON deployments(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deployments_stack_id ON deployments(stack_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deployments_requested_at ON deployments(requested_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_run_log_entries_deployment
         ON run_log_entries(deployment_id, seq)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_runs_stack_service
         ON pipeline_runs(stack_id, service)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pipeline_runs_status ON pipeline_runs(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
