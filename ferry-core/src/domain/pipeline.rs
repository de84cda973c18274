//! Pipeline run domain types
//!
//! A pipeline run delivers one microservice through build, push and deploy.
//! The state machine is:
//!
//! ```text
//! Pending -> Building -> Pushing -> Deploying -> Succeeded
//!               |           |           |
//!               +-----------+-----------+------> Failed
//! ```
//!
//! A stage only starts once the previous one succeeded. A failed run is never
//! resumed; a new run has to be launched.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;

/// One phase of a per-service delivery run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Build,
    Push,
    Deploy,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Build, Stage::Push, Stage::Deploy];

    /// The stage after this one, if any
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Build => Some(Stage::Push),
            Stage::Push => Some(Stage::Deploy),
            Stage::Deploy => None,
        }
    }

    /// Run status while this stage executes
    pub fn running_status(self) -> PipelineStatus {
        match self {
            Stage::Build => PipelineStatus::Building,
            Stage::Push => PipelineStatus::Pushing,
            Stage::Deploy => PipelineStatus::Deploying,
        }
    }

    fn index(self) -> usize {
        match self {
            Stage::Build => 0,
            Stage::Push => 1,
            Stage::Deploy => 2,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Build => write!(f, "build"),
            Stage::Push => write!(f, "push"),
            Stage::Deploy => write!(f, "deploy"),
        }
    }
}

/// Overall status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Pending,
    Building,
    Pushing,
    Deploying,
    Succeeded,
    Failed,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStatus::Succeeded | PipelineStatus::Failed)
    }

    /// Stage currently executing, if any
    pub fn stage(self) -> Option<Stage> {
        match self {
            PipelineStatus::Building => Some(Stage::Build),
            PipelineStatus::Pushing => Some(Stage::Push),
            PipelineStatus::Deploying => Some(Stage::Deploy),
            _ => None,
        }
    }

    fn position(self) -> u8 {
        match self {
            PipelineStatus::Pending => 0,
            PipelineStatus::Building => 1,
            PipelineStatus::Pushing => 2,
            PipelineStatus::Deploying => 3,
            PipelineStatus::Succeeded => 4,
            PipelineStatus::Failed => 5,
        }
    }

    /// Whether a stored run may move from `self` to `next`
    ///
    /// Re-reporting the same status is allowed. Terminal states are final and
    /// `Failed` is reachable from every non-terminal state. Otherwise status
    /// moves one step at a time, so no stage is ever skipped.
    pub fn can_advance_to(self, next: PipelineStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next == PipelineStatus::Failed || next.position() == self.position() + 1
    }

    /// Whether `stages` is the stage record set a run in this status carries
    ///
    /// Stages before the current one succeeded, the current one is running
    /// (or failed, for a failed run) and later ones have not run.
    pub fn matches_stages(self, stages: &[StageRecord]) -> bool {
        if stages.len() != Stage::ALL.len()
            || stages.iter().zip(Stage::ALL).any(|(r, s)| r.stage != s)
        {
            return false;
        }

        match self {
            PipelineStatus::Pending => stages.iter().all(|r| r.status == StageStatus::NotRun),
            PipelineStatus::Succeeded => stages.iter().all(|r| r.status == StageStatus::Succeeded),
            PipelineStatus::Failed => {
                let Some(failed) = stages.iter().position(|r| r.status == StageStatus::Failed)
                else {
                    return false;
                };
                stages.iter().enumerate().all(|(i, r)| match i.cmp(&failed) {
                    Ordering::Less => r.status == StageStatus::Succeeded,
                    Ordering::Equal => true,
                    Ordering::Greater => r.status == StageStatus::NotRun,
                })
            }
            running => {
                let Some(current) = running.stage() else {
                    return false;
                };
                stages.iter().all(|r| {
                    let expected = match r.stage.index().cmp(&current.index()) {
                        Ordering::Less => StageStatus::Succeeded,
                        Ordering::Equal => StageStatus::Running,
                        Ordering::Greater => StageStatus::NotRun,
                    };
                    r.status == expected
                })
            }
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Pending => write!(f, "Pending"),
            PipelineStatus::Building => write!(f, "Building"),
            PipelineStatus::Pushing => write!(f, "Pushing"),
            PipelineStatus::Deploying => write!(f, "Deploying"),
            PipelineStatus::Succeeded => write!(f, "Succeeded"),
            PipelineStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Status of an individual stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    NotRun,
    Running,
    Succeeded,
    Failed,
}

/// Record of one stage of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Stage output (built image, pushed reference, ...)
    pub output: Option<String>,

    pub error: Option<String>,
}

impl StageRecord {
    fn not_run(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::NotRun,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
        }
    }
}

/// Per-microservice delivery run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub stack_id: Uuid,

    /// Name of the workload resource being delivered
    pub service: String,

    pub status: PipelineStatus,

    /// Image tag the build stage produces
    pub tag: String,

    /// Always one record per stage, in stage order
    pub stages: Vec<StageRecord>,

    /// Latest image reference produced by the run
    pub image: Option<String>,

    pub error: Option<String>,
    pub runner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Creates a pending run tagged with the first 12 hex digits of its id
    pub fn new(stack_id: Uuid, service: impl Into<String>) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let mut tag = id.simple().to_string();
        tag.truncate(12);

        Self {
            id,
            stack_id,
            service: service.into(),
            status: PipelineStatus::Pending,
            tag,
            stages: Stage::ALL.into_iter().map(StageRecord::not_run).collect(),
            image: None,
            error: None,
            runner_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overrides the image tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn stage(&self, stage: Stage) -> &StageRecord {
        &self.stages[stage.index()]
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut StageRecord {
        &mut self.stages[stage.index()]
    }

    /// Stage currently executing, if any
    pub fn current_stage(&self) -> Option<Stage> {
        self.status.stage()
    }

    /// Starts the run: `Pending -> Building`
    pub fn begin(&mut self) -> Result<Stage, TransitionError> {
        if self.status != PipelineStatus::Pending {
            return Err(TransitionError {
                from: self.status,
                action: "begin",
            });
        }

        self.start_stage(Stage::Build);
        Ok(Stage::Build)
    }

    /// Marks the running stage as succeeded and starts the next one
    ///
    /// Returns the stage now running, or `None` when the run succeeded.
    pub fn complete_stage(
        &mut self,
        output: Option<String>,
    ) -> Result<Option<Stage>, TransitionError> {
        let current = self.current_stage().ok_or(TransitionError {
            from: self.status,
            action: "complete a stage of",
        })?;

        let now = Utc::now();
        if output.is_some() {
            self.image = output.clone();
        }
        let record = self.stage_mut(current);
        record.status = StageStatus::Succeeded;
        record.completed_at = Some(now);
        record.output = output;

        match current.next() {
            Some(next) => {
                self.start_stage(next);
                Ok(Some(next))
            }
            None => {
                self.status = PipelineStatus::Succeeded;
                self.updated_at = now;
                Ok(None)
            }
        }
    }

    /// Marks the running stage and the run as failed
    ///
    /// Later stages stay `NotRun`.
    pub fn fail_stage(&mut self, error: impl Into<String>) -> Result<Stage, TransitionError> {
        let current = self.current_stage().ok_or(TransitionError {
            from: self.status,
            action: "fail a stage of",
        })?;

        let error = error.into();
        let now = Utc::now();
        let record = self.stage_mut(current);
        record.status = StageStatus::Failed;
        record.completed_at = Some(now);
        record.error = Some(error.clone());

        self.status = PipelineStatus::Failed;
        self.error = Some(format!("{} stage failed: {}", current, error));
        self.updated_at = now;
        Ok(current)
    }

    fn start_stage(&mut self, stage: Stage) {
        let now = Utc::now();
        let record = self.stage_mut(stage);
        record.status = StageStatus::Running;
        record.started_at = Some(now);
        self.status = stage.running_status();
        self.updated_at = now;
    }
}
