//! Error kinds shared by planner, executor and pipeline runner

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::pipeline::PipelineStatus;
use crate::domain::resource::ResourceKind;

/// Bad or cyclic desired state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("desired state name cannot be empty")]
    EmptyStateName,

    #[error("invalid resource name '{0}' (use 1-63 lowercase letters, digits or '-')")]
    InvalidName(String),

    #[error("resource '{0}' is declared more than once")]
    DuplicateResource(String),

    #[error("resource '{0}' depends on itself")]
    SelfDependency(String),

    #[error("resource '{resource}' depends on undeclared resource '{dependency}'")]
    MissingDependency { resource: String, dependency: String },

    #[error(
        "{kind} '{resource}' cannot depend on {dependency_kind} '{dependency}' (higher rank)"
    )]
    RankInversion {
        resource: String,
        kind: ResourceKind,
        dependency: String,
        dependency_kind: ResourceKind,
    },

    #[error("resource '{0}' has a build spec but is not a workload")]
    BuildOnNonWorkload(String),

    #[error("dependency cycle between: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("'{0}' is not a buildable service of this desired state")]
    UnknownService(String),
}

/// Failure of a single operation against an external system
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// Retryable: rate limits, eventual-consistency lag, flaky network
    #[error("transient failure: {0}")]
    Transient(String),

    /// Not retryable; halts the operation's dependency subtree
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl OperationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::Transient,
            Self::Permanent(_) => ErrorKind::Permanent,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Permanent(msg) => msg,
        }
    }
}

/// Error kind as shown in run logs and failure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Transient,
    Permanent,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "ValidationError"),
            ErrorKind::Transient => write!(f, "TransientError"),
            ErrorKind::Permanent => write!(f, "PermanentError"),
        }
    }
}

/// Serializable error detail recorded against an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&OperationError> for ErrorDetail {
    fn from(err: &OperationError) -> Self {
        Self {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }
}

impl From<&ValidationError> for ErrorDetail {
    fn from(err: &ValidationError) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: err.to_string(),
        }
    }
}

/// Invalid pipeline state machine transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} a pipeline run in state {from:?}")]
pub struct TransitionError {
    pub from: PipelineStatus,
    pub action: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_retry() {
        assert!(OperationError::transient("429").is_retryable());
        assert!(!OperationError::permanent("denied").is_retryable());
    }

    #[test]
    fn test_error_detail_from_operation_error() {
        let detail = ErrorDetail::from(&OperationError::permanent("quota exceeded"));
        assert_eq!(detail.kind, ErrorKind::Permanent);
        assert_eq!(detail.message, "quota exceeded");
    }

    #[test]
    fn test_cycle_message_lists_resources() {
        let err = ValidationError::Cycle(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "dependency cycle between: a, b");
    }
}
