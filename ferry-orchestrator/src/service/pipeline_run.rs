//! Pipeline Run Service
//!
//! Business logic for per-service build, push and deploy runs.

use ferry_core::domain::pipeline::PipelineRun;
use ferry_core::domain::state::DesiredState;
use ferry_core::dto::pipeline::{CreatePipelineRun, PipelineRunExecutionInfo};
use ferry_core::error::ValidationError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{pipeline_run_repository, stack_repository};

/// Service error type
#[derive(Debug)]
pub enum PipelineRunError {
    NotFound(Uuid),
    StackNotFound(Uuid),
    Conflict(String),
    InvalidState(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for PipelineRunError {
    fn from(err: sqlx::Error) -> Self {
        PipelineRunError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, PipelineRunError>;

/// Queue a pipeline run for one service of a stack
///
/// At most one run per service may be active at a time.
pub async fn launch_pipeline_run(pool: &PgPool, req: CreatePipelineRun) -> Result<PipelineRun> {
    let stack = stack_repository::find_by_id(pool, req.stack_id)
        .await?
        .ok_or(PipelineRunError::StackNotFound(req.stack_id))?;

    validate_service(&stack.desired, &req.service)?;

    if let Some(active) =
        pipeline_run_repository::find_active(pool, stack.id, &req.service).await?
    {
        return Err(PipelineRunError::Conflict(format!(
            "Service '{}' already has an active pipeline run {} ({})",
            req.service, active.id, active.status
        )));
    }

    let run = new_run(stack.id, req)?;
    pipeline_run_repository::create(pool, &run).await?;

    tracing::info!(
        "Pipeline run {} queued for service {} of stack {} (tag {})",
        run.id,
        run.service,
        stack.name,
        run.tag
    );

    Ok(run)
}

/// Get a run by ID
pub async fn get_pipeline_run(pool: &PgPool, id: Uuid) -> Result<PipelineRun> {
    pipeline_run_repository::find_by_id(pool, id)
        .await?
        .ok_or(PipelineRunError::NotFound(id))
}

/// List runs of a stack
pub async fn list_pipeline_runs_by_stack(
    pool: &PgPool,
    stack_id: Uuid,
) -> Result<Vec<PipelineRun>> {
    // Verify stack exists
    let _stack = stack_repository::find_by_id(pool, stack_id)
        .await?
        .ok_or(PipelineRunError::StackNotFound(stack_id))?;

    let runs = pipeline_run_repository::find_by_stack(pool, stack_id).await?;
    Ok(runs)
}

/// List pending runs waiting for a runner
pub async fn list_scheduled_pipeline_runs(pool: &PgPool) -> Result<Vec<PipelineRun>> {
    let runs = pipeline_run_repository::find_unclaimed(pool).await?;
    Ok(runs)
}

/// Assign a pending run to a runner
///
/// The run stays `Pending`; the runner starts the build stage itself and
/// reports the transition.
pub async fn reserve_pipeline_run_for_execution(
    pool: &PgPool,
    id: Uuid,
    runner_id: String,
) -> Result<PipelineRunExecutionInfo> {
    if runner_id.trim().is_empty() {
        return Err(PipelineRunError::ValidationError(
            "runner_id cannot be empty".to_string(),
        ));
    }

    let run = get_pipeline_run(pool, id).await?;

    let stack = stack_repository::find_by_id(pool, run.stack_id)
        .await?
        .ok_or(PipelineRunError::StackNotFound(run.stack_id))?;

    if !pipeline_run_repository::claim(pool, id, &runner_id).await? {
        return Err(PipelineRunError::InvalidState(format!(
            "Pipeline run {} is not waiting for a runner (status: {}, runner: {})",
            id,
            run.status,
            run.runner_id.as_deref().unwrap_or("none")
        )));
    }

    tracing::info!("Pipeline run {} reserved by runner {}", id, runner_id);

    let run = get_pipeline_run(pool, id).await?;

    Ok(PipelineRunExecutionInfo {
        run,
        desired: stack.desired,
    })
}

/// Store a run record reported by its runner
pub async fn report_pipeline_run(
    pool: &PgPool,
    id: Uuid,
    report: PipelineRun,
) -> Result<PipelineRun> {
    let stored = get_pipeline_run(pool, id).await?;

    validate_report(&stored, &report)?;

    pipeline_run_repository::update_progress(pool, &report).await?;

    if report.status != stored.status {
        match &report.error {
            Some(error) if report.status.is_terminal() => {
                tracing::error!("Pipeline run {} failed: {}", id, error)
            }
            _ => tracing::info!(
                "Pipeline run {} moved {} -> {}",
                id,
                stored.status,
                report.status
            ),
        }
    }

    get_pipeline_run(pool, id).await
}

// =============================================================================
// Validation
// =============================================================================

fn validate_service(desired: &DesiredState, service: &str) -> Result<()> {
    if desired.services().any(|s| s.name == service) {
        Ok(())
    } else {
        Err(PipelineRunError::ValidationError(
            ValidationError::UnknownService(service.to_string()).to_string(),
        ))
    }
}

fn new_run(stack_id: Uuid, req: CreatePipelineRun) -> Result<PipelineRun> {
    let run = PipelineRun::new(stack_id, req.service);

    match req.tag {
        None => Ok(run),
        Some(tag) if is_valid_tag(&tag) => Ok(run.with_tag(tag)),
        Some(tag) => Err(PipelineRunError::ValidationError(format!(
            "invalid image tag '{}'",
            tag
        ))),
    }
}

/// Docker tag grammar: 1-128 of `[A-Za-z0-9_.-]`, not starting with `.` or `-`
fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 128
        && !tag.starts_with(['.', '-'])
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn validate_report(stored: &PipelineRun, report: &PipelineRun) -> Result<()> {
    if report.id != stored.id {
        return Err(PipelineRunError::ValidationError(format!(
            "Reported run {} does not match {}",
            report.id, stored.id
        )));
    }

    if report.stack_id != stored.stack_id || report.service != stored.service {
        return Err(PipelineRunError::ValidationError(
            "stack and service of a pipeline run cannot change".to_string(),
        ));
    }

    let Some(claimant) = stored.runner_id.as_deref() else {
        return Err(PipelineRunError::InvalidState(format!(
            "Pipeline run {} has not been claimed by a runner",
            stored.id
        )));
    };

    if report.runner_id.as_deref() != Some(claimant) {
        return Err(PipelineRunError::Conflict(format!(
            "Pipeline run {} is claimed by runner {}, not {}",
            stored.id,
            claimant,
            report.runner_id.as_deref().unwrap_or("none")
        )));
    }

    if !stored.status.can_advance_to(report.status) {
        return Err(PipelineRunError::InvalidState(format!(
            "Pipeline run {} cannot move from {} to {}",
            stored.id, stored.status, report.status
        )));
    }

    if !report.status.matches_stages(&report.stages) {
        return Err(PipelineRunError::ValidationError(format!(
            "stage records of pipeline run {} do not match status {}",
            stored.id, report.status
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::pipeline::{PipelineStatus, StageStatus};
    use ferry_core::domain::resource::{BuildSpec, ResourceDecl, ResourceKind};

    fn claimed_run() -> PipelineRun {
        let mut run = PipelineRun::new(Uuid::new_v4(), "orders");
        run.runner_id = Some("runner-1".to_string());
        run
    }

    #[test]
    fn test_only_buildable_workloads_are_services() {
        let desired = DesiredState::new("shop")
            .with(ResourceDecl::new("pg", ResourceKind::Database))
            .with(ResourceDecl::new("orders", ResourceKind::Workload).with_build(BuildSpec {
                context: "services/orders".to_string(),
                dockerfile: None,
                repository: "registry.local/orders".to_string(),
            }));

        assert!(validate_service(&desired, "orders").is_ok());
        assert!(validate_service(&desired, "pg").is_err());
        assert!(validate_service(&desired, "billing").is_err());
    }

    #[test]
    fn test_tag_validation() {
        assert!(is_valid_tag("v1.2.0"));
        assert!(is_valid_tag("3f2a9c1b7d4e"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag("-latest"));
        assert!(!is_valid_tag("has space"));
        assert!(!is_valid_tag(&"a".repeat(129)));
    }

    #[test]
    fn test_new_run_keeps_requested_tag() {
        let req = CreatePipelineRun {
            stack_id: Uuid::new_v4(),
            service: "orders".to_string(),
            tag: Some("v2".to_string()),
        };
        let run = new_run(req.stack_id, req).unwrap();
        assert_eq!(run.tag, "v2");
        assert_eq!(run.status, PipelineStatus::Pending);
    }

    #[test]
    fn test_forward_report_is_accepted() {
        let stored = claimed_run();
        let mut report = stored.clone();
        report.begin().unwrap();

        assert!(validate_report(&stored, &report).is_ok());
    }

    #[test]
    fn test_backward_report_is_rejected() {
        let mut stored = claimed_run();
        stored.begin().unwrap();
        stored.complete_stage(Some("orders:abc".to_string())).unwrap();

        let mut report = stored.clone();
        report.status = PipelineStatus::Building;

        assert!(matches!(
            validate_report(&stored, &report),
            Err(PipelineRunError::InvalidState(_))
        ));
    }

    #[test]
    fn test_report_cannot_retarget_run() {
        let stored = claimed_run();
        let mut report = stored.clone();
        report.service = "billing".to_string();

        assert!(matches!(
            validate_report(&stored, &report),
            Err(PipelineRunError::ValidationError(_))
        ));
    }

    #[test]
    fn test_skipped_stage_report_is_rejected() {
        let mut stored = claimed_run();
        stored.begin().unwrap();

        let mut report = stored.clone();
        report.complete_stage(Some("orders:abc".to_string())).unwrap();
        report.complete_stage(Some("registry/orders@sha256:1".to_string())).unwrap();

        assert!(matches!(
            validate_report(&stored, &report),
            Err(PipelineRunError::InvalidState(_))
        ));
    }

    #[test]
    fn test_inconsistent_stage_records_are_rejected() {
        let mut stored = claimed_run();
        stored.begin().unwrap();

        let mut report = stored.clone();
        report.complete_stage(Some("orders:abc".to_string())).unwrap();
        report.stages[2].status = StageStatus::Succeeded;

        assert!(matches!(
            validate_report(&stored, &report),
            Err(PipelineRunError::ValidationError(_))
        ));

        let mut report = stored.clone();
        report.stages.pop();

        assert!(matches!(
            validate_report(&stored, &report),
            Err(PipelineRunError::ValidationError(_))
        ));
    }

    #[test]
    fn test_report_from_another_runner_is_rejected() {
        let stored = claimed_run();
        let mut report = stored.clone();
        report.begin().unwrap();
        report.runner_id = Some("runner-2".to_string());

        assert!(matches!(
            validate_report(&stored, &report),
            Err(PipelineRunError::Conflict(_))
        ));

        report.runner_id = None;
        assert!(matches!(
            validate_report(&stored, &report),
            Err(PipelineRunError::Conflict(_))
        ));
    }

    #[test]
    fn test_unclaimed_run_cannot_be_reported() {
        let mut stored = claimed_run();
        stored.runner_id = None;

        assert!(matches!(
            validate_report(&stored, &stored.clone()),
            Err(PipelineRunError::InvalidState(_))
        ));
    }
}
