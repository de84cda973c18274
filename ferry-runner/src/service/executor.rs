//! Operation executor
//!
//! Applies planned operations against a provider. Operations whose in-batch
//! prerequisites have all succeeded run concurrently, bounded by a
//! semaphore. A failed operation halts its transitive dependents while
//! unrelated branches keep going. The executor is the only writer of
//! run-log state, and every provider call it makes (operations and live
//! observation) is bounded by the same retry policy and timeout.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use ferry_core::domain::operation::{Operation, OperationStatus};
use ferry_core::domain::run_log::{RunLog, RunLogEntry};
use ferry_core::domain::state::{DesiredState, ObservedState};
use ferry_core::error::{ErrorDetail, OperationError, ValidationError};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

use super::retry::RetryPolicy;
use super::run_log::RunLogSink;
use crate::provider::ResourceProvider;

/// Applies operation batches and records their progress
#[derive(Clone)]
pub struct Executor {
    provider: Arc<dyn ResourceProvider>,
    sink: Arc<dyn RunLogSink>,
    retry: RetryPolicy,
    operation_timeout: Duration,
    max_parallel: usize,
}

/// Result of running one operation to completion
struct Outcome {
    index: usize,
    result: Result<(), OperationError>,
    attempts: u32,
}

/// In-batch dependency edges by operation index
struct Graph {
    dependents: Vec<Vec<usize>>,
    prerequisites: Vec<usize>,
}

impl Graph {
    /// Ids not present in the batch are treated as already satisfied
    fn new(operations: &[Operation]) -> Self {
        let index: HashMap<&str, usize> = operations
            .iter()
            .enumerate()
            .map(|(idx, op)| (op.id.as_str(), idx))
            .collect();

        let mut dependents = vec![Vec::new(); operations.len()];
        let mut prerequisites = vec![0; operations.len()];

        for (idx, op) in operations.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in &op.depends_on {
                if let Some(&dep_idx) = index.get(dep.as_str())
                    && dep_idx != idx
                    && seen.insert(dep_idx)
                {
                    dependents[dep_idx].push(idx);
                    prerequisites[idx] += 1;
                }
            }
        }

        Self {
            dependents,
            prerequisites,
        }
    }
}

impl Executor {
    pub fn new(provider: Arc<dyn ResourceProvider>, sink: Arc<dyn RunLogSink>) -> Self {
        Self {
            provider,
            sink,
            retry: RetryPolicy::default(),
            operation_timeout: Duration::from_secs(300),
            max_parallel: 4,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Applies a batch of operations given in plan order
    pub async fn apply(&self, operations: Vec<Operation>) -> RunLog {
        info!("Applying {} operation(s)", operations.len());

        let mut log = RunLog::new(&operations);
        for entry in &log.entries {
            self.sink.record(entry.clone());
        }

        let graph = Graph::new(&operations);
        let mut waiting = graph.prerequisites.clone();
        let mut ready: VecDeque<usize> = (0..operations.len())
            .filter(|idx| waiting[*idx] == 0)
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = JoinSet::new();
        let mut running: HashMap<Id, usize> = HashMap::new();

        loop {
            while let Some(idx) = ready.pop_front() {
                let executor = self.clone();
                let op = operations[idx].clone();
                let semaphore = Arc::clone(&semaphore);
                let handle =
                    tasks.spawn(async move { executor.run_operation(idx, op, semaphore).await });
                running.insert(handle.id(), idx);
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };

            let outcome = match joined {
                Ok((id, outcome)) => {
                    running.remove(&id);
                    outcome
                }
                Err(e) => {
                    let Some(index) = running.remove(&e.id()) else {
                        error!("Unknown operation task failed: {}", e);
                        continue;
                    };
                    Outcome {
                        index,
                        result: Err(OperationError::permanent(format!(
                            "operation task failed: {}",
                            e
                        ))),
                        attempts: 1,
                    }
                }
            };

            let op = &operations[outcome.index];
            match outcome.result {
                Ok(()) => {
                    info!("Operation {} succeeded", op.id);
                    let mut entry =
                        RunLogEntry::pending(op).with_status(OperationStatus::Succeeded);
                    entry.attempts = outcome.attempts;
                    self.record(&mut log, entry);

                    for &dependent in &graph.dependents[outcome.index] {
                        waiting[dependent] -= 1;
                        if waiting[dependent] == 0 {
                            ready.push_back(dependent);
                        }
                    }
                }
                Err(err) => {
                    error!(
                        "Operation {} failed after {} attempt(s): {}",
                        op.id, outcome.attempts, err
                    );
                    let mut entry = RunLogEntry::pending(op).with_status(OperationStatus::Failed);
                    entry.attempts = outcome.attempts;
                    entry.error = Some(ErrorDetail::from(&err));
                    self.record(&mut log, entry);

                    self.halt_dependents(outcome.index, &graph, &operations, &mut log);
                }
            }
        }

        self.fail_unreachable(&operations, &mut log);
        log.finish();

        info!(
            "Applied {} operation(s): {} succeeded, {} failed, {} halted",
            operations.len(),
            log.count(OperationStatus::Succeeded),
            log.count(OperationStatus::Failed),
            log.count(OperationStatus::Halted)
        );

        log
    }

    /// Observes live state, retrying transient failures
    ///
    /// Each attempt is bounded by the operation timeout. A timed-out
    /// observation is dropped, which kills a hook still running.
    pub async fn observe(&self, desired: &DesiredState) -> Result<ObservedState, OperationError> {
        let label = format!("observe of '{}'", desired.name);
        let timeout = self.operation_timeout;
        let provider = &self.provider;

        let (result, attempts) = self
            .retry
            .run(
                &label,
                |attempt| debug!("Observing '{}' attempt {}", desired.name, attempt),
                move || async move {
                    tokio::time::timeout(timeout, provider.observe(desired))
                        .await
                        .unwrap_or_else(|_| Err(timed_out(timeout)))
                },
            )
            .await;

        if let Err(e) = &result {
            error!(
                "Observing '{}' failed after {} attempt(s): {}",
                desired.name, attempts, e
            );
        }
        result
    }

    /// Runs one operation with retries once a permit is available
    async fn run_operation(
        self,
        index: usize,
        op: Operation,
        semaphore: Arc<Semaphore>,
    ) -> Outcome {
        let _permit = semaphore.acquire_owned().await.ok();

        let started = RunLogEntry::pending(&op);
        let (result, attempts) = self
            .retry
            .run(
                &op.id,
                |attempt| {
                    debug!("Operation {} attempt {}", op.id, attempt);
                    let mut entry = started.with_status(OperationStatus::Running);
                    entry.attempts = attempt;
                    self.sink.record(entry);
                },
                || apply_once(Arc::clone(&self.provider), op.clone(), self.operation_timeout),
            )
            .await;

        Outcome {
            index,
            result,
            attempts,
        }
    }

    /// Records every transitive dependent of a failed operation as halted
    fn halt_dependents(
        &self,
        failed: usize,
        graph: &Graph,
        operations: &[Operation],
        log: &mut RunLog,
    ) {
        let failed_id = &operations[failed].id;
        let mut queue: VecDeque<usize> = graph.dependents[failed].iter().copied().collect();
        let mut visited = HashSet::new();

        while let Some(idx) = queue.pop_front() {
            if !visited.insert(idx) {
                continue;
            }
            let op = &operations[idx];
            if log.status(&op.id).is_some_and(OperationStatus::is_terminal) {
                continue;
            }

            warn!("Halting {} because {} failed", op.id, failed_id);
            let mut entry = RunLogEntry::pending(op).with_status(OperationStatus::Halted);
            entry.halted_by = Some(failed_id.clone());
            self.record(log, entry);

            queue.extend(graph.dependents[idx].iter().copied());
        }
    }

    /// Fails operations that could never become ready (dependency loop in the batch)
    fn fail_unreachable(&self, operations: &[Operation], log: &mut RunLog) {
        let stuck: Vec<&Operation> = operations
            .iter()
            .filter(|op| log.status(&op.id) == Some(OperationStatus::Pending))
            .collect();
        if stuck.is_empty() {
            return;
        }

        let cycle = ValidationError::Cycle(stuck.iter().map(|op| op.id.clone()).collect());
        error!("{}", cycle);
        for op in stuck {
            let mut entry = RunLogEntry::pending(op).with_status(OperationStatus::Failed);
            entry.error = Some(ErrorDetail::from(&cycle));
            self.record(log, entry);
        }
    }

    fn record(&self, log: &mut RunLog, entry: RunLogEntry) {
        self.sink.record(entry.clone());
        log.record(entry);
    }
}

/// One bounded attempt; a timeout surfaces as a permanent failure
///
/// The provider call runs on its own task so a timed-out call is left to
/// finish in the background rather than being dropped mid-flight.
async fn apply_once(
    provider: Arc<dyn ResourceProvider>,
    op: Operation,
    timeout: Duration,
) -> Result<(), OperationError> {
    let call = tokio::spawn(async move { provider.apply(&op).await });

    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(OperationError::permanent(format!(
            "provider task failed: {}",
            e
        ))),
        Err(_) => Err(timed_out(timeout)),
    }
}

fn timed_out(timeout: Duration) -> OperationError {
    OperationError::permanent(format!("timed out after {:?}", timeout))
}
