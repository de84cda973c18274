//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::deployment_service::DeploymentError;
use crate::service::pipeline_run_service::PipelineRunError;
use crate::service::stack_service::StackError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    DatabaseError(sqlx::Error),
}

impl ApiError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<StackError> for ApiError {
    fn from(err: StackError) -> Self {
        match err {
            StackError::NotFound(id) => ApiError::NotFound(format!("Stack {} not found", id)),
            StackError::ValidationError(msg) => ApiError::BadRequest(msg),
            StackError::InvalidState(msg) => ApiError::BadRequest(msg),
            StackError::Conflict(msg) => ApiError::Conflict(msg),
            StackError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<DeploymentError> for ApiError {
    fn from(err: DeploymentError) -> Self {
        match err {
            DeploymentError::NotFound(id) => {
                ApiError::NotFound(format!("Deployment {} not found", id))
            }
            DeploymentError::StackNotFound(id) => {
                ApiError::NotFound(format!("Stack {} not found", id))
            }
            DeploymentError::Conflict(msg) => ApiError::Conflict(msg),
            DeploymentError::InvalidState(msg) => ApiError::BadRequest(msg),
            DeploymentError::ValidationError(msg) => ApiError::BadRequest(msg),
            DeploymentError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<PipelineRunError> for ApiError {
    fn from(err: PipelineRunError) -> Self {
        match err {
            PipelineRunError::NotFound(id) => {
                ApiError::NotFound(format!("Pipeline run {} not found", id))
            }
            PipelineRunError::StackNotFound(id) => {
                ApiError::NotFound(format!("Stack {} not found", id))
            }
            PipelineRunError::Conflict(msg) => ApiError::Conflict(msg),
            PipelineRunError::InvalidState(msg) => ApiError::BadRequest(msg),
            PipelineRunError::ValidationError(msg) => ApiError::BadRequest(msg),
            PipelineRunError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_service_errors_map_to_status_codes() {
        let id = Uuid::new_v4();

        let (status, msg) = ApiError::from(StackError::NotFound(id)).status_and_message();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(msg.contains(&id.to_string()));

        let (status, _) =
            ApiError::from(PipelineRunError::Conflict("busy".to_string())).status_and_message();
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) =
            ApiError::from(DeploymentError::Conflict("active".to_string())).status_and_message();
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = ApiError::from(DeploymentError::InvalidState("done".to_string()))
            .status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_database_errors_hide_details() {
        let (status, msg) = ApiError::from(sqlx::Error::RowNotFound).status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(msg, "Internal server error");
    }
}
