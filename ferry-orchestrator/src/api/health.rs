//! Health Check API Handler
//!
//! Liveness endpoint used by runners before they start polling.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;

/// GET /health
/// Reports 503 while the database is unreachable
pub async fn health_check(State(pool): State<PgPool>) -> (StatusCode, Json<Value>) {
    let database = sqlx::query("SELECT 1").execute(&pool).await;

    let (status, database) = match database {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(err) => {
            tracing::warn!("Health check could not reach the database: {}", err);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    (
        status,
        Json(json!({
            "service": "ferry-orchestrator",
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
        })),
    )
}
