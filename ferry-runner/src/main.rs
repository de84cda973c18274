//! Ferry Runner
//!
//! A stateless worker that converges infrastructure and delivers services.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Providers: Reach external systems through operator-supplied hooks
//! - Services: Executor, live reconciler and pipeline runner
//! - Scheduler: Work polling and lifecycle management
//!
//! The runner polls the orchestrator for queued deployments and pipeline
//! runs, executes them, and streams run-log entries back periodically.

mod config;
mod docker;
mod provider;
mod scheduler;
mod service;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::docker::DockerImageBuilder;
use crate::provider::{HookProvider, ResourceProvider};
use crate::scheduler::Poller;
use crate::service::ImageBuilder;
use ferry_client::OrchestratorClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ferry Runner");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: runner_id={}, orchestrator_url={}",
        config.runner_id, config.orchestrator_url
    );

    // Initialize orchestrator client
    let client = Arc::new(OrchestratorClient::new(config.orchestrator_url.clone()));

    info!("Orchestrator client initialized");

    if let Err(e) = docker::check_docker_available(&config.docker_bin).await {
        warn!("Pipeline runs will fail until docker is available: {:#}", e);
    }

    if !config.hooks_dir.is_dir() {
        warn!(
            "Hooks directory {} does not exist; every operation will fail",
            config.hooks_dir.display()
        );
    }

    // Wait for the orchestrator (with retry logic)
    wait_for_orchestrator(&client).await?;
    info!("Orchestrator is reachable");

    let provider: Arc<dyn ResourceProvider> =
        Arc::new(HookProvider::new(config.hooks_dir.clone()));
    let builder: Arc<dyn ImageBuilder> =
        Arc::new(DockerImageBuilder::new(config.docker_bin.clone()));

    info!("Services initialized");

    // Create work poller
    let poller = Poller::new(config.clone(), client, provider, builder);

    info!("Runner initialized successfully");
    info!(
        "Poll interval: {:?}, Log send interval: {:?}, Max parallel operations: {}",
        config.poll_interval, config.log_send_interval, config.max_parallel_operations
    );

    // Start polling loop
    if let Err(e) = poller.run().await {
        error!("Poller error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(_) => {
            info!("Failed to load config from environment, using defaults");
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Waits for the orchestrator with exponential backoff
///
/// This handles the case where the orchestrator may not be ready yet when
/// the runner starts (common in container environments).
async fn wait_for_orchestrator(client: &OrchestratorClient) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match client.health().await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Reached orchestrator after {} attempt(s)", attempt);
                }
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Orchestrator unreachable after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Orchestrator unreachable: {}", e));
                }

                warn!(
                    "Orchestrator not reachable (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
