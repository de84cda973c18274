//! Stack domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::DesiredState;

/// A registered desired state
///
/// Structure shared between orchestrator (persists) and runner (converges).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stack {
    pub id: Uuid,
    pub name: String,
    pub desired: DesiredState,

    /// Whether the orchestrator enqueues periodic reconciliation
    pub auto_reconcile: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
