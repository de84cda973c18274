//! Work poller
//!
//! Polls the orchestrator for queued deployments and pending pipeline runs
//! and executes each claimed item in its own task.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ferry_client::OrchestratorClient;
use ferry_core::domain::deployment::{DeploymentMode, DeploymentStatus};
use ferry_core::domain::pipeline::PipelineRun;
use ferry_core::domain::run_log::RunLog;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::provider::ResourceProvider;
use crate::service::{
    Executor, ImageBuilder, PipelineRunner, Reconciler, RunLogBuffer, RunReporter,
};

/// A unit of work the orchestrator handed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Work {
    Deployment(Uuid),
    PipelineRun(Uuid),
}

impl Work {
    fn id(self) -> Uuid {
        match self {
            Work::Deployment(id) | Work::PipelineRun(id) => id,
        }
    }
}

/// Everything a work task needs, cheap to clone into it
#[derive(Clone)]
struct Worker {
    config: Config,
    client: Arc<OrchestratorClient>,
    provider: Arc<dyn ResourceProvider>,
    builder: Arc<dyn ImageBuilder>,
}

/// Poller that continuously claims and executes work
pub struct Poller {
    worker: Worker,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Poller {
    /// Creates a new poller
    pub fn new(
        config: Config,
        client: Arc<OrchestratorClient>,
        provider: Arc<dyn ResourceProvider>,
        builder: Arc<dyn ImageBuilder>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            worker: Worker {
                config,
                client,
                provider,
                builder,
            },
            semaphore,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting work poller (interval: {:?})",
            self.worker.config.poll_interval
        );

        let mut interval = time::interval(self.worker.config.poll_interval);

        loop {
            interval.tick().await;

            debug!("Polling for queued work");

            match self.poll_once().await {
                Ok(started) => {
                    if started > 0 {
                        info!("Started {} work item(s) this cycle", started);
                    }
                }
                Err(e) => {
                    error!("Error during poll cycle: {:#}", e);
                }
            }
        }
    }

    /// Performs a single poll cycle, returning how many items were started
    async fn poll_once(&self) -> Result<usize> {
        let client = &self.worker.client;

        let deployments = client
            .list_scheduled_deployments()
            .await
            .context("Failed to fetch scheduled deployments")?;
        let runs = client
            .list_scheduled_pipeline_runs()
            .await
            .context("Failed to fetch scheduled pipeline runs")?;

        let work: Vec<Work> = deployments
            .iter()
            .map(|d| Work::Deployment(d.id))
            .chain(runs.iter().map(|r| Work::PipelineRun(r.id)))
            .collect();

        if work.is_empty() {
            debug!("No work available");
            return Ok(0);
        }

        let mut started = 0;
        for item in work {
            if self.lock_in_flight().contains(&item.id()) {
                continue;
            }

            // Try to acquire semaphore permit, skip if at max capacity
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                debug!("Max parallel jobs reached, leaving {:?} for later", item);
                break;
            };

            self.lock_in_flight().insert(item.id());
            self.spawn_work(item, permit);
            started += 1;
        }

        Ok(started)
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns a task executing one work item
    fn spawn_work(&self, work: Work, permit: OwnedSemaphorePermit) {
        let worker = self.worker.clone();
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let result = match work {
                Work::Deployment(id) => worker.execute_deployment(id).await,
                Work::PipelineRun(id) => worker.execute_pipeline_run(id).await,
            };
            if let Err(e) = result {
                error!("Failed to execute {:?}: {:#}", work, e);
            }

            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&work.id());
            // Permit is released when dropped
            drop(permit);
        });
    }
}

impl Worker {
    fn executor(&self, buffer: RunLogBuffer) -> Executor {
        Executor::new(Arc::clone(&self.provider), Arc::new(buffer))
            .with_retry(self.config.retry)
            .with_operation_timeout(self.config.operation_timeout)
            .with_max_parallel(self.config.max_parallel_operations)
    }

    /// Claims a deployment, executes it and reports the outcome
    async fn execute_deployment(&self, deployment_id: Uuid) -> Result<()> {
        let info = self
            .client
            .claim_deployment(deployment_id, &self.config.runner_id)
            .await
            .context("Failed to claim deployment")?;

        info!(
            "Claimed deployment {} ({}) of stack {}",
            info.deployment_id, info.mode, info.stack_id
        );

        let buffer = RunLogBuffer::new();
        let log_sender = Self::spawn_log_sender(
            deployment_id,
            buffer.clone(),
            Arc::clone(&self.client),
            self.config.log_send_interval,
        );

        let executor = self.executor(buffer.clone());
        let outcome: std::result::Result<Option<RunLog>, String> = match info.mode {
            DeploymentMode::Apply => Ok(Some(executor.apply(info.operations).await)),
            DeploymentMode::Reconcile { dry_run } => {
                let reconciler = Reconciler::new(executor);
                match reconciler.diff(&info.desired).await {
                    Ok(operations) => {
                        if let Err(e) = self
                            .client
                            .record_operations(deployment_id, operations.clone())
                            .await
                        {
                            warn!("Failed to record reconcile operations: {:#}", e);
                        }
                        if dry_run {
                            Ok(None)
                        } else {
                            Ok(Some(reconciler.converge(operations).await))
                        }
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
        };

        // Always abort log sender
        log_sender.abort();

        // Send remaining entries
        let remaining = buffer.drain();
        if !remaining.is_empty() {
            debug!(
                "Sending {} remaining run-log entries for deployment {}",
                remaining.len(),
                deployment_id
            );
            if let Err(e) = self.client.send_run_log(deployment_id, remaining).await {
                warn!("Failed to send final run-log entries: {:#}", e);
            }
        }

        let (status, error) = match outcome {
            Ok(Some(log)) if !log.is_success() => {
                (DeploymentStatus::Failed, Some(failure_summary(&log)))
            }
            Ok(_) => (DeploymentStatus::Succeeded, None),
            Err(message) => (DeploymentStatus::Failed, Some(message)),
        };

        info!("Deployment {} finished with status: {}", deployment_id, status);

        self.client
            .complete_deployment(deployment_id, status, error)
            .await
            .context("Failed to complete deployment")?;

        Ok(())
    }

    /// Claims a pipeline run and drives it to a terminal status
    async fn execute_pipeline_run(&self, run_id: Uuid) -> Result<()> {
        let info = self
            .client
            .claim_pipeline_run(run_id, &self.config.runner_id)
            .await
            .context("Failed to claim pipeline run")?;

        let mut run = info.run;
        info!("Claimed pipeline run {} for service {}", run.id, run.service);

        let reporter = Arc::new(RemoteReporter {
            client: Arc::clone(&self.client),
        });
        let runner = PipelineRunner::new(
            Arc::clone(&self.builder),
            self.executor(RunLogBuffer::new()),
            reporter,
        )
        .with_retry(self.config.retry);

        let status = runner
            .run(&mut run, &info.desired)
            .await
            .context("Pipeline run is not pending")?;

        info!("Pipeline run {} finished with status: {}", run.id, status);
        Ok(())
    }

    /// Spawns a background task to send run-log entries periodically
    fn spawn_log_sender(
        deployment_id: Uuid,
        buffer: RunLogBuffer,
        client: Arc<OrchestratorClient>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);

            loop {
                ticker.tick().await;

                let entries = buffer.drain();

                if entries.is_empty() {
                    continue;
                }

                debug!(
                    "Sending {} run-log entries for deployment {}",
                    entries.len(),
                    deployment_id
                );

                if let Err(e) = client.send_run_log(deployment_id, entries).await {
                    error!(
                        "Failed to send run-log entries for deployment {}: {:#}",
                        deployment_id, e
                    );
                }
            }
        })
    }
}

/// Reports pipeline run transitions to the orchestrator
struct RemoteReporter {
    client: Arc<OrchestratorClient>,
}

#[async_trait]
impl RunReporter for RemoteReporter {
    async fn report(&self, run: &PipelineRun) {
        if let Err(e) = self.client.report_pipeline_run(run).await {
            warn!("Failed to report pipeline run {}: {:#}", run.id, e);
        }
    }
}

/// One line per failed operation, naming the halted subtree
fn failure_summary(log: &RunLog) -> String {
    let failures: Vec<String> = log.failures().iter().map(ToString::to_string).collect();
    if failures.is_empty() {
        return "not every operation succeeded".to_string();
    }
    failures.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::operation::{Operation, OperationAction, OperationStatus};
    use ferry_core::domain::resource::{ResourceDecl, ResourceKind};
    use ferry_core::domain::run_log::RunLogEntry;
    use ferry_core::error::{ErrorDetail, OperationError};

    #[test]
    fn test_failure_summary_names_failed_operation_and_halted_subtree() {
        let eks = Operation::for_decl(
            OperationAction::Create,
            &ResourceDecl::new("eks", ResourceKind::Cluster),
        );
        let orders = Operation::for_decl(
            OperationAction::Create,
            &ResourceDecl::new("orders", ResourceKind::Workload),
        );
        let mut log = RunLog::new(&[eks.clone(), orders.clone()]);

        let mut failed = RunLogEntry::pending(&eks).with_status(OperationStatus::Failed);
        failed.error = Some(ErrorDetail::from(&OperationError::permanent("quota exceeded")));
        log.record(failed);
        let mut halted = RunLogEntry::pending(&orders).with_status(OperationStatus::Halted);
        halted.halted_by = Some(eks.id.clone());
        log.record(halted);

        let summary = failure_summary(&log);
        assert!(summary.contains("create:eks"));
        assert!(summary.contains("quota exceeded"));
        assert!(summary.contains("create:orders"));
    }

    #[test]
    fn test_work_ids() {
        let id = Uuid::new_v4();
        assert_eq!(Work::Deployment(id).id(), id);
        assert_eq!(Work::PipelineRun(id).id(), id);
    }
}
