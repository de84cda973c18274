//! Live state reconciler
//!
//! Observes live resources, diffs them against the desired state and
//! applies the corrective operations. Both observation and operations go
//! through the executor, so they share its retry policy and timeout.

use ferry_core::domain::operation::Operation;
use ferry_core::domain::run_log::RunLog;
use ferry_core::domain::state::DesiredState;
use ferry_core::error::{OperationError, ValidationError};
use thiserror::Error;
use tracing::info;

use super::executor::Executor;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid desired state: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to observe live state: {0}")]
    Observe(#[from] OperationError),
}

pub struct Reconciler {
    executor: Executor,
}

impl Reconciler {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Computes the operations that would converge live state
    pub async fn diff(&self, desired: &DesiredState) -> Result<Vec<Operation>, ReconcileError> {
        let observed = self.executor.observe(desired).await?;
        let operations = ferry_core::reconcile(desired, &observed)?;

        if operations.is_empty() {
            info!("'{}' has no drift", desired.name);
        } else {
            info!(
                "'{}' drifted: {} corrective operation(s)",
                desired.name,
                operations.len()
            );
        }
        Ok(operations)
    }

    /// Applies previously computed corrective operations
    pub async fn converge(&self, operations: Vec<Operation>) -> RunLog {
        self.executor.apply(operations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MemoryProvider, ResourceProvider};
    use crate::service::retry::RetryPolicy;
    use crate::service::run_log::RunLogBuffer;
    use std::sync::Arc;
    use std::time::Duration;
    use ferry_core::domain::resource::{ObservedResource, ResourceDecl, ResourceKind};
    use ferry_core::domain::state::ObservedState;
    use serde_json::json;

    fn desired() -> DesiredState {
        DesiredState::new("shop")
            .with(ResourceDecl::new("vpc", ResourceKind::Network))
            .with(
                ResourceDecl::new("orders", ResourceKind::Workload)
                    .depends_on("vpc")
                    .with_property("replicas", json!(3)),
            )
    }

    fn reconciler(provider: &Arc<MemoryProvider>) -> Reconciler {
        let provider: Arc<dyn ResourceProvider> = provider.clone();
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let executor = Executor::new(provider, Arc::new(RunLogBuffer::new()))
            .with_retry(retry)
            .with_operation_timeout(Duration::from_millis(50));
        Reconciler::new(executor)
    }

    #[tokio::test]
    async fn test_reconcile_converges_and_becomes_idempotent() {
        let provider = Arc::new(MemoryProvider::with_live(ObservedState::new(vec![
            ObservedResource::from(&ResourceDecl::new("vpc", ResourceKind::Network)),
            ObservedResource::from(&ResourceDecl::new("legacy", ResourceKind::Workload)),
        ])));
        let reconciler = reconciler(&provider);
        let desired = desired();

        let ops = reconciler.diff(&desired).await.unwrap();
        let ids: Vec<&str> = ops.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(ids, vec!["delete:legacy", "create:orders"]);

        let log = reconciler.converge(ops).await;
        assert!(log.is_success());
        assert!(reconciler.diff(&desired).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_converged_state_yields_no_operations() {
        let desired = desired();
        let provider = Arc::new(MemoryProvider::with_live(ObservedState::from(&desired)));

        assert!(reconciler(&provider).diff(&desired).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hung_observation_fails_the_diff() {
        let provider = Arc::new(MemoryProvider::new());
        provider.delay_observe(Duration::from_secs(30));

        let err = reconciler(&provider).diff(&desired()).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Observe(ref e) if e.message().contains("timed out")
        ));
    }

    #[tokio::test]
    async fn test_transient_observation_failure_is_retried() {
        let provider = Arc::new(MemoryProvider::new());
        provider.fail_observe([OperationError::transient("api throttled")]);

        let ops = reconciler(&provider).diff(&desired()).await.unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(provider.observe_calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_desired_state_is_reported() {
        let provider = Arc::new(MemoryProvider::new());
        let desired = DesiredState::new("shop")
            .with(ResourceDecl::new("orders", ResourceKind::Workload).depends_on("eks"));

        assert!(matches!(
            reconciler(&provider).diff(&desired).await,
            Err(ReconcileError::Validation(_))
        ));
    }
}
