//! Pipeline run API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use ferry_core::domain::pipeline::PipelineRun;
use ferry_core::dto::pipeline::{
    CreatePipelineRun, ExecutePipelineRunRequest, PipelineRunExecutionInfo,
};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Runs
    // =============================================================================

    /// Queue a build, push and deploy run for one service
    ///
    /// Fails with a 409 while another run of the same service is active.
    pub async fn launch_pipeline_run(&self, req: CreatePipelineRun) -> Result<PipelineRun> {
        let response = self
            .client
            .post(self.url("/pipeline-run/launch"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a pipeline run by ID
    pub async fn get_pipeline_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        let url = self.url(&format!("/pipeline-run/{}", run_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all pipeline runs of a stack, newest first
    pub async fn list_pipeline_runs_by_stack(&self, stack_id: Uuid) -> Result<Vec<PipelineRun>> {
        let url = self.url(&format!("/pipeline-run/stack/{}", stack_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List pending pipeline runs
    pub async fn list_scheduled_pipeline_runs(&self) -> Result<Vec<PipelineRun>> {
        let response = self
            .client
            .get(self.url("/pipeline-run/list/scheduled"))
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Pipeline Run Execution (Runner-specific)
    // =============================================================================

    /// Claim a pending pipeline run
    pub async fn claim_pipeline_run(
        &self,
        run_id: Uuid,
        runner_id: &str,
    ) -> Result<PipelineRunExecutionInfo> {
        let url = self.url(&format!("/pipeline-run/execute/{}", run_id));
        let response = self
            .client
            .post(&url)
            .json(&ExecutePipelineRunRequest {
                runner_id: runner_id.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Report the run record after a state transition
    pub async fn report_pipeline_run(&self, run: &PipelineRun) -> Result<()> {
        let url = self.url(&format!("/pipeline-run/{}", run.id));
        let response = self.client.put(&url).json(run).send().await?;

        self.handle_empty_response(response).await
    }
}
