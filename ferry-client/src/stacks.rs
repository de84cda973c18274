//! Stack-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use ferry_core::domain::operation::Operation;
use ferry_core::domain::stack::Stack;
use ferry_core::dto::stack::{CreateStack, StackSummary, UpdateStack};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Stack Management
    // =============================================================================

    /// Register a new desired state
    ///
    /// The orchestrator validates the desired state with the planner and
    /// rejects it with a 400 if it is invalid.
    ///
    /// # Example
    /// ```no_run
    /// # use ferry_client::OrchestratorClient;
    /// # use ferry_core::domain::state::DesiredState;
    /// # use ferry_core::dto::stack::CreateStack;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let stack = client.create_stack(CreateStack {
    ///     desired: DesiredState::new("shop"),
    ///     auto_reconcile: true,
    /// }).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_stack(&self, req: CreateStack) -> Result<Stack> {
        let response = self
            .client
            .post(self.url("/stack/create"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List all stacks
    pub async fn list_stacks(&self) -> Result<Vec<StackSummary>> {
        let response = self.client.get(self.url("/stack/list")).send().await?;

        self.handle_response(response).await
    }

    /// Get a stack by ID
    pub async fn get_stack(&self, stack_id: Uuid) -> Result<Stack> {
        let url = self.url(&format!("/stack/{}", stack_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Replace the desired state of a stack
    pub async fn update_stack(&self, stack_id: Uuid, req: UpdateStack) -> Result<Stack> {
        let url = self.url(&format!("/stack/{}", stack_id));
        let response = self.client.put(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Delete a stack and its history
    pub async fn delete_stack(&self, stack_id: Uuid) -> Result<()> {
        let url = self.url(&format!("/stack/{}", stack_id));
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Get the ordered operations that would apply a stack from scratch
    pub async fn plan_stack(&self, stack_id: Uuid) -> Result<Vec<Operation>> {
        let url = self.url(&format!("/stack/{}/plan", stack_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
