//! In-memory provider used by runner tests

use async_trait::async_trait;
use ferry_core::domain::operation::{Operation, OperationAction};
use ferry_core::domain::resource::ObservedResource;
use ferry_core::domain::state::{DesiredState, ObservedState};
use ferry_core::error::OperationError;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::ResourceProvider;

/// Provider keeping live resources in a map, with scripted failures
#[derive(Default)]
pub struct MemoryProvider {
    live: Mutex<Vec<ObservedResource>>,
    failures: Mutex<HashMap<String, VecDeque<OperationError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    applied: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    observe_failures: Mutex<VecDeque<OperationError>>,
    observe_delay: Mutex<Option<Duration>>,
    observe_calls: AtomicUsize,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the given live state
    pub fn with_live(live: ObservedState) -> Self {
        let provider = Self::new();
        *provider.live.lock().unwrap() = live.resources;
        provider
    }

    /// The next applications of `operation_id` fail with these errors, in order
    pub fn fail(&self, operation_id: &str, errors: impl IntoIterator<Item = OperationError>) {
        self.failures
            .lock()
            .unwrap()
            .entry(operation_id.to_string())
            .or_default()
            .extend(errors);
    }

    /// Every application of `operation_id` takes this long
    pub fn delay(&self, operation_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(operation_id.to_string(), delay);
    }

    /// The next observations fail with these errors, in order
    pub fn fail_observe(&self, errors: impl IntoIterator<Item = OperationError>) {
        self.observe_failures.lock().unwrap().extend(errors);
    }

    /// Every observation takes this long
    pub fn delay_observe(&self, delay: Duration) {
        *self.observe_delay.lock().unwrap() = Some(delay);
    }

    /// Number of observations started
    pub fn observe_calls(&self) -> usize {
        self.observe_calls.load(Ordering::SeqCst)
    }

    /// Ids of successfully applied operations, in completion order
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    /// Highest number of operations seen in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> ObservedState {
        ObservedState::new(self.live.lock().unwrap().clone())
    }
}

#[async_trait]
impl ResourceProvider for MemoryProvider {
    async fn observe(&self, _desired: &DesiredState) -> Result<ObservedState, OperationError> {
        self.observe_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.observe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.observe_failures.lock().unwrap().pop_front();
        match scripted {
            Some(err) => Err(err),
            None => Ok(self.live()),
        }
    }

    async fn apply(&self, operation: &Operation) -> Result<(), OperationError> {
        let in_flight = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(in_flight, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(&operation.id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&operation.id)
            .and_then(|queue| queue.pop_front());

        self.running.fetch_sub(1, Ordering::SeqCst);
        if let Some(err) = scripted {
            return Err(err);
        }

        let mut live = self.live.lock().unwrap();
        live.retain(|r| r.name != operation.resource.name);
        if operation.action != OperationAction::Delete {
            live.push(ObservedResource {
                name: operation.resource.name.clone(),
                kind: operation.resource.kind,
                properties: operation.properties.clone(),
                depends_on: operation
                    .depends_on
                    .iter()
                    .filter_map(|id| id.split_once(':').map(|(_, name)| name.to_string()))
                    .collect(),
            });
        }
        drop(live);

        self.applied.lock().unwrap().push(operation.id.clone());
        Ok(())
    }
}
