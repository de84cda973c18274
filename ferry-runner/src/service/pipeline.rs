//! Pipeline runner
//!
//! Drives one service through build, push and deploy. Each stage only
//! starts once the previous one succeeded; a failure stops the run and
//! nothing already deployed is rolled back.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::domain::operation::{Operation, OperationAction};
use ferry_core::domain::pipeline::{PipelineRun, PipelineStatus};
use ferry_core::domain::resource::{BuildSpec, IMAGE_PROPERTY};
use ferry_core::domain::state::DesiredState;
use ferry_core::error::{OperationError, TransitionError, ValidationError};
use serde_json::json;
use tracing::{error, info};

use super::executor::Executor;
use super::retry::RetryPolicy;

/// Builds and publishes container images
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Builds the service image and returns its local reference
    async fn build(
        &self,
        service: &str,
        spec: &BuildSpec,
        tag: &str,
    ) -> Result<String, OperationError>;

    /// Pushes an image and returns the pushed reference
    async fn push(&self, image: &str) -> Result<String, OperationError>;
}

/// Receives the run record after every state transition
#[async_trait]
pub trait RunReporter: Send + Sync {
    async fn report(&self, run: &PipelineRun);
}

pub struct PipelineRunner {
    builder: Arc<dyn ImageBuilder>,
    executor: Executor,
    reporter: Arc<dyn RunReporter>,
    retry: RetryPolicy,
}

impl PipelineRunner {
    pub fn new(
        builder: Arc<dyn ImageBuilder>,
        executor: Executor,
        reporter: Arc<dyn RunReporter>,
    ) -> Self {
        Self {
            builder,
            executor,
            reporter,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs a pending pipeline run to a terminal status
    pub async fn run(
        &self,
        run: &mut PipelineRun,
        desired: &DesiredState,
    ) -> Result<PipelineStatus, TransitionError> {
        run.begin()?;
        self.reporter.report(run).await;
        info!("Pipeline run {} started for service {}", run.id, run.service);

        let Some((decl, spec)) = desired
            .services()
            .find(|decl| decl.name == run.service)
            .and_then(|decl| decl.build.as_ref().map(|spec| (decl, spec)))
        else {
            let err = ValidationError::UnknownService(run.service.clone());
            return self.fail(run, err.to_string()).await;
        };

        let service = run.service.clone();
        let tag = run.tag.clone();
        let builder = &*self.builder;

        // Build
        let (service_ref, tag_ref) = (service.as_str(), tag.as_str());
        let label = format!("build of {}", service);
        let image = match self
            .stage(&label, move || builder.build(service_ref, spec, tag_ref))
            .await
        {
            Ok(image) => image,
            Err(e) => return self.fail(run, e.to_string()).await,
        };
        run.complete_stage(Some(image.clone()))?;
        self.reporter.report(run).await;

        // Push
        let label = format!("push of {}", image);
        let image_ref = image.as_str();
        let pushed = match self.stage(&label, move || builder.push(image_ref)).await {
            Ok(pushed) => pushed,
            Err(e) => return self.fail(run, e.to_string()).await,
        };
        run.complete_stage(Some(pushed.clone()))?;
        self.reporter.report(run).await;

        // Deploy
        let mut op = Operation::for_decl(OperationAction::Update, decl);
        op.properties
            .insert(IMAGE_PROPERTY.to_string(), json!(pushed));
        let log = self.executor.apply(vec![op]).await;

        if log.is_success() {
            run.complete_stage(None)?;
            self.reporter.report(run).await;
            info!("Pipeline run {} succeeded: {} deployed", run.id, pushed);
        } else {
            let message = log
                .failures()
                .first()
                .map(|failure| failure.to_string())
                .unwrap_or_else(|| "deploy operation did not complete".to_string());
            return self.fail(run, message).await;
        }

        Ok(run.status)
    }

    async fn stage<T, F, Fut>(&self, label: &str, f: F) -> Result<T, OperationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        self.retry.run(label, |_| {}, f).await.0
    }

    async fn fail(
        &self,
        run: &mut PipelineRun,
        message: String,
    ) -> Result<PipelineStatus, TransitionError> {
        let stage = run.fail_stage(message)?;
        error!(
            "Pipeline run {} failed at {} stage: {}",
            run.id,
            stage,
            run.error.as_deref().unwrap_or_default()
        );
        self.reporter.report(run).await;
        Ok(run.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MemoryProvider, ResourceProvider};
    use crate::service::reconciler::Reconciler;
    use crate::service::run_log::RunLogBuffer;
    use ferry_core::domain::pipeline::{Stage, StageStatus};
    use ferry_core::domain::resource::{ResourceDecl, ResourceKind};
    use ferry_core::domain::state::ObservedState;
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeBuilder {
        fail_build: Option<OperationError>,
        push_failures: Mutex<Vec<OperationError>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageBuilder for FakeBuilder {
        async fn build(
            &self,
            service: &str,
            spec: &BuildSpec,
            tag: &str,
        ) -> Result<String, OperationError> {
            self.calls.lock().unwrap().push(format!("build {}", service));
            match &self.fail_build {
                Some(err) => Err(err.clone()),
                None => Ok(format!("{}:{}", spec.repository, tag)),
            }
        }

        async fn push(&self, image: &str) -> Result<String, OperationError> {
            self.calls.lock().unwrap().push(format!("push {}", image));
            match self.push_failures.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok(format!("{}@sha256:feed", image.split(':').next().unwrap())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        statuses: Mutex<Vec<PipelineStatus>>,
    }

    #[async_trait]
    impl RunReporter for RecordingReporter {
        async fn report(&self, run: &PipelineRun) {
            self.statuses.lock().unwrap().push(run.status);
        }
    }

    fn desired() -> DesiredState {
        DesiredState::new("shop")
            .with(ResourceDecl::new("eks", ResourceKind::Cluster))
            .with(
                ResourceDecl::new("orders", ResourceKind::Workload)
                    .depends_on("eks")
                    .with_build(BuildSpec {
                        context: "services/orders".to_string(),
                        dockerfile: None,
                        repository: "registry.local/orders".to_string(),
                    }),
            )
    }

    struct Harness {
        runner: PipelineRunner,
        provider: Arc<MemoryProvider>,
        builder: Arc<FakeBuilder>,
        reporter: Arc<RecordingReporter>,
    }

    fn harness(builder: FakeBuilder) -> Harness {
        harness_on(builder, ObservedState::default())
    }

    fn harness_on(builder: FakeBuilder, live: ObservedState) -> Harness {
        let provider = Arc::new(MemoryProvider::with_live(live));
        let builder = Arc::new(builder);
        let reporter = Arc::new(RecordingReporter::default());
        let dyn_provider: Arc<dyn ResourceProvider> = provider.clone();
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let executor =
            Executor::new(dyn_provider, Arc::new(RunLogBuffer::new())).with_retry(retry);
        let runner =
            PipelineRunner::new(builder.clone(), executor, reporter.clone()).with_retry(retry);

        Harness {
            runner,
            provider,
            builder,
            reporter,
        }
    }

    #[tokio::test]
    async fn test_successful_run_deploys_pushed_image() {
        let h = harness(FakeBuilder::default());
        let mut run = PipelineRun::new(Uuid::new_v4(), "orders");

        let status = h.runner.run(&mut run, &desired()).await.unwrap();

        assert_eq!(status, PipelineStatus::Succeeded);
        assert_eq!(run.image.as_deref(), Some("registry.local/orders@sha256:feed"));
        assert_eq!(
            *h.reporter.statuses.lock().unwrap(),
            vec![
                PipelineStatus::Building,
                PipelineStatus::Pushing,
                PipelineStatus::Deploying,
                PipelineStatus::Succeeded
            ]
        );

        assert_eq!(h.provider.applied(), vec!["update:orders".to_string()]);
        let live = h.provider.live();
        let orders = live.resource("orders").unwrap();
        assert_eq!(orders.properties["image"], json!("registry.local/orders@sha256:feed"));
    }

    #[tokio::test]
    async fn test_reconcile_after_deploy_keeps_the_image() {
        let desired = desired();
        let h = harness_on(FakeBuilder::default(), ObservedState::from(&desired));
        let mut run = PipelineRun::new(Uuid::new_v4(), "orders");
        let status = h.runner.run(&mut run, &desired).await.unwrap();
        assert_eq!(status, PipelineStatus::Succeeded);

        let provider: Arc<dyn ResourceProvider> = h.provider.clone();
        let reconciler = Reconciler::new(Executor::new(provider, Arc::new(RunLogBuffer::new())));
        assert!(reconciler.diff(&desired).await.unwrap().is_empty());

        let mut scaled = desired.clone();
        scaled.resources[1]
            .properties
            .insert("replicas".to_string(), json!(4));
        let ops = reconciler.diff(&scaled).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert!(reconciler.converge(ops).await.is_success());

        let live = h.provider.live();
        let orders = live.resource("orders").unwrap();
        assert_eq!(orders.properties["replicas"], json!(4));
        assert_eq!(
            orders.properties[IMAGE_PROPERTY],
            json!("registry.local/orders@sha256:feed")
        );
    }

    #[tokio::test]
    async fn test_build_failure_stops_the_run() {
        let h = harness(FakeBuilder {
            fail_build: Some(OperationError::permanent("COPY failed")),
            ..Default::default()
        });
        let mut run = PipelineRun::new(Uuid::new_v4(), "orders");

        let status = h.runner.run(&mut run, &desired()).await.unwrap();

        assert_eq!(status, PipelineStatus::Failed);
        assert_eq!(run.stage(Stage::Build).status, StageStatus::Failed);
        assert_eq!(run.stage(Stage::Push).status, StageStatus::NotRun);
        assert_eq!(run.stage(Stage::Deploy).status, StageStatus::NotRun);
        assert_eq!(*h.builder.calls.lock().unwrap(), vec!["build orders".to_string()]);
        assert!(h.provider.applied().is_empty());
    }

    #[tokio::test]
    async fn test_transient_push_failure_is_retried() {
        let h = harness(FakeBuilder {
            push_failures: Mutex::new(vec![OperationError::transient("503 Service Unavailable")]),
            ..Default::default()
        });
        let mut run = PipelineRun::new(Uuid::new_v4(), "orders");

        let status = h.runner.run(&mut run, &desired()).await.unwrap();

        assert_eq!(status, PipelineStatus::Succeeded);
        let pushes = h
            .builder
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("push"))
            .count();
        assert_eq!(pushes, 2);
    }

    #[tokio::test]
    async fn test_deploy_failure_fails_deploy_stage() {
        let h = harness(FakeBuilder::default());
        h.provider
            .fail("update:orders", [OperationError::permanent("image pull backoff")]);
        let mut run = PipelineRun::new(Uuid::new_v4(), "orders");

        let status = h.runner.run(&mut run, &desired()).await.unwrap();

        assert_eq!(status, PipelineStatus::Failed);
        assert_eq!(run.stage(Stage::Push).status, StageStatus::Succeeded);
        assert_eq!(run.stage(Stage::Deploy).status, StageStatus::Failed);
        assert!(run.error.as_deref().unwrap().contains("image pull backoff"));
    }

    #[tokio::test]
    async fn test_unknown_service_fails_before_building() {
        let h = harness(FakeBuilder::default());
        let mut run = PipelineRun::new(Uuid::new_v4(), "eks");

        let status = h.runner.run(&mut run, &desired()).await.unwrap();

        assert_eq!(status, PipelineStatus::Failed);
        assert!(h.builder.calls.lock().unwrap().is_empty());
        assert!(run.error.as_deref().unwrap().contains("not a buildable service"));
    }

    #[tokio::test]
    async fn test_only_pending_runs_can_start() {
        let h = harness(FakeBuilder::default());
        let mut run = PipelineRun::new(Uuid::new_v4(), "orders");
        run.begin().unwrap();

        assert!(h.runner.run(&mut run, &desired()).await.is_err());
    }
}
