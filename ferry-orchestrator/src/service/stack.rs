//! Stack Service
//!
//! Business logic for registering and editing desired states.

use ferry_core::domain::operation::Operation;
use ferry_core::domain::stack::Stack;
use ferry_core::domain::state::DesiredState;
use ferry_core::dto::stack::{CreateStack, StackSummary, UpdateStack};
use ferry_core::planner;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{deployment_repository, stack_repository};

/// Service error type
#[derive(Debug)]
pub enum StackError {
    NotFound(Uuid),
    ValidationError(String),
    InvalidState(String),
    Conflict(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for StackError {
    fn from(err: sqlx::Error) -> Self {
        StackError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, StackError>;

/// Register a new desired state
pub async fn create_stack(pool: &PgPool, req: CreateStack) -> Result<Stack> {
    validate_desired_state(&req.desired)?;

    if stack_repository::find_by_name(pool, &req.desired.name)
        .await?
        .is_some()
    {
        return Err(StackError::Conflict(format!(
            "A stack named '{}' already exists",
            req.desired.name
        )));
    }

    let stack = stack_repository::create(pool, req).await?;

    tracing::info!(
        "Stack created: {} ({}) with {} resources",
        stack.name,
        stack.id,
        stack.desired.resources.len()
    );

    Ok(stack)
}

/// Get a stack by ID
pub async fn get_stack(pool: &PgPool, id: Uuid) -> Result<Stack> {
    stack_repository::find_by_id(pool, id)
        .await?
        .ok_or(StackError::NotFound(id))
}

/// List all stacks
pub async fn list_stacks(pool: &PgPool) -> Result<Vec<StackSummary>> {
    let stacks = stack_repository::list_all(pool).await?;
    Ok(stacks.into_iter().map(StackSummary::from).collect())
}

/// Replace the desired state of a stack
pub async fn update_stack(pool: &PgPool, id: Uuid, req: UpdateStack) -> Result<Stack> {
    validate_desired_state(&req.desired)?;

    let existing = get_stack(pool, id).await?;

    if existing.name != req.desired.name
        && let Some(other) = stack_repository::find_by_name(pool, &req.desired.name).await?
        && other.id != id
    {
        return Err(StackError::Conflict(format!(
            "A stack named '{}' already exists",
            req.desired.name
        )));
    }

    let auto_reconcile = req.auto_reconcile.unwrap_or(existing.auto_reconcile);
    let updated = stack_repository::update(pool, id, &req.desired, auto_reconcile).await?;
    if !updated {
        return Err(StackError::NotFound(id));
    }

    tracing::info!("Stack {} updated", id);

    get_stack(pool, id).await
}

/// Delete a stack and everything recorded for it
pub async fn delete_stack(pool: &PgPool, id: Uuid) -> Result<()> {
    if deployment_repository::has_active(pool, id).await? {
        return Err(StackError::InvalidState(format!(
            "Stack {} has a queued or running deployment",
            id
        )));
    }

    let deleted = stack_repository::delete(pool, id).await?;
    if !deleted {
        return Err(StackError::NotFound(id));
    }

    tracing::info!("Stack {} deleted", id);

    Ok(())
}

/// Plan the stored desired state of a stack
pub async fn plan_stack(pool: &PgPool, id: Uuid) -> Result<Vec<Operation>> {
    let stack = get_stack(pool, id).await?;

    planner::plan(&stack.desired).map_err(|e| StackError::ValidationError(e.to_string()))
}

// =============================================================================
// Validation
// =============================================================================

fn validate_desired_state(desired: &DesiredState) -> Result<()> {
    planner::validate(desired).map_err(|e| StackError::ValidationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::resource::{ResourceDecl, ResourceKind};

    #[test]
    fn test_valid_desired_state_passes() {
        let desired = DesiredState::new("shop")
            .with(ResourceDecl::new("vpc", ResourceKind::Network))
            .with(ResourceDecl::new("eks", ResourceKind::Cluster).depends_on("vpc"));

        assert!(validate_desired_state(&desired).is_ok());
    }

    #[test]
    fn test_cyclic_desired_state_is_a_validation_error() {
        let desired = DesiredState::new("shop")
            .with(ResourceDecl::new("a", ResourceKind::Workload).depends_on("b"))
            .with(ResourceDecl::new("b", ResourceKind::Workload).depends_on("a"));

        match validate_desired_state(&desired) {
            Err(StackError::ValidationError(msg)) => assert!(msg.contains("cycle")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_unnamed_desired_state_is_rejected() {
        let desired = DesiredState::new("");
        assert!(matches!(
            validate_desired_state(&desired),
            Err(StackError::ValidationError(_))
        ));
    }
}
