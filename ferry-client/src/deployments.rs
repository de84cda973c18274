//! Deployment-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use ferry_core::domain::deployment::{Deployment, DeploymentStatus};
use ferry_core::domain::operation::Operation;
use ferry_core::domain::run_log::RunLogEntry;
use ferry_core::dto::deployment::{
    CompleteDeployment, CreateDeployment, DeploymentExecutionInfo, ExecuteDeploymentRequest,
    RecordOperations, RunLogBatch,
};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Deployment Lifecycle
    // =============================================================================

    /// Queue an apply or reconcile deployment for a stack
    ///
    /// # Example
    /// ```no_run
    /// # use ferry_client::OrchestratorClient;
    /// # use ferry_core::domain::deployment::DeploymentMode;
    /// # use ferry_core::dto::deployment::CreateDeployment;
    /// # use uuid::Uuid;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let deployment = client.launch_deployment(CreateDeployment {
    ///     stack_id: Uuid::new_v4(),
    ///     mode: DeploymentMode::Reconcile { dry_run: true },
    /// }).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn launch_deployment(&self, req: CreateDeployment) -> Result<Deployment> {
        let response = self
            .client
            .post(self.url("/deployment/launch"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a deployment by ID
    pub async fn get_deployment(&self, deployment_id: Uuid) -> Result<Deployment> {
        let url = self.url(&format!("/deployment/{}", deployment_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all deployments of a stack, newest first
    pub async fn list_deployments_by_stack(&self, stack_id: Uuid) -> Result<Vec<Deployment>> {
        let url = self.url(&format!("/deployment/stack/{}", stack_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List queued deployments
    pub async fn list_scheduled_deployments(&self) -> Result<Vec<Deployment>> {
        let response = self
            .client
            .get(self.url("/deployment/list/scheduled"))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Cancel a queued deployment
    pub async fn cancel_deployment(&self, deployment_id: Uuid) -> Result<()> {
        let url = self.url(&format!("/deployment/{}/cancel", deployment_id));
        let response = self.client.post(&url).send().await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Deployment Execution (Runner-specific)
    // =============================================================================

    /// Claim a queued deployment for execution by a runner
    pub async fn claim_deployment(
        &self,
        deployment_id: Uuid,
        runner_id: &str,
    ) -> Result<DeploymentExecutionInfo> {
        let url = self.url(&format!("/deployment/execute/{}", deployment_id));
        let response = self
            .client
            .post(&url)
            .json(&ExecuteDeploymentRequest {
                runner_id: runner_id.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Record the operations a reconcile deployment computed
    pub async fn record_operations(
        &self,
        deployment_id: Uuid,
        operations: Vec<Operation>,
    ) -> Result<()> {
        let url = self.url(&format!("/deployment/{}/operations", deployment_id));
        let response = self
            .client
            .put(&url)
            .json(&RecordOperations { operations })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Report the final status of a deployment
    pub async fn complete_deployment(
        &self,
        deployment_id: Uuid,
        status: DeploymentStatus,
        error: Option<String>,
    ) -> Result<()> {
        let url = self.url(&format!("/deployment/{}/complete", deployment_id));
        let response = self
            .client
            .post(&url)
            .json(&CompleteDeployment { status, error })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Run Logs
    // =============================================================================

    /// Get the run-log entries of a deployment in the order they were recorded
    pub async fn get_run_log(&self, deployment_id: Uuid) -> Result<Vec<RunLogEntry>> {
        let url = self.url(&format!("/deployment/{}/run-log", deployment_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Send run-log entries for a deployment
    pub async fn send_run_log(&self, deployment_id: Uuid, entries: Vec<RunLogEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let url = self.url(&format!("/deployment/{}/run-log", deployment_id));
        let response = self
            .client
            .post(&url)
            .json(&RunLogBatch {
                deployment_id,
                entries,
            })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}
