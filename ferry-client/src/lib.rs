//! Ferry HTTP Client
//!
//! A type-safe HTTP client for the Ferry orchestrator API, shared by the
//! runner and the CLI.
//!
//! # Example
//!
//! ```no_run
//! use ferry_client::OrchestratorClient;
//! use ferry_core::domain::resource::{ResourceDecl, ResourceKind};
//! use ferry_core::domain::state::DesiredState;
//! use ferry_core::dto::stack::CreateStack;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let stack = client.create_stack(CreateStack {
//!         desired: DesiredState::new("shop")
//!             .with(ResourceDecl::new("vpc", ResourceKind::Network)),
//!         auto_reconcile: false,
//!     }).await?;
//!
//!     println!("Created stack: {}", stack.id);
//!     Ok(())
//! }
//! ```

mod deployments;
pub mod error;
mod pipeline_runs;
mod stacks;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use ferry_core::dto::deployment::DeploymentExecutionInfo;
pub use ferry_core::dto::pipeline::PipelineRunExecutionInfo;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

/// HTTP client for the Ferry orchestrator API
///
/// Endpoints are grouped by entity:
/// - Stacks (desired-state registration, plans)
/// - Deployments (apply / reconcile lifecycle, run logs)
/// - Pipeline runs (build, push, deploy per service)
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use ferry_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the orchestrator is up
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;

        self.handle_empty_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        debug!("Orchestrator responded {}: {}", status, error_text);
        Err(ClientError::api_error(
            status.as_u16(),
            error::extract_message(&error_text),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OrchestratorClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080//");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/stack/list"), "http://localhost:8080/stack/list");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = OrchestratorClient::with_client("https://ferry.internal", http_client);
        assert_eq!(client.base_url(), "https://ferry.internal");
    }
}
