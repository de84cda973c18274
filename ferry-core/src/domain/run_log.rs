//! Run log domain types
//!
//! A run log records the progress of one `Apply` call, one entry per
//! operation. Entries are produced by the executor only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::operation::{Operation, OperationAction, OperationStatus};
use super::resource::ResourceRef;
use crate::error::{ErrorDetail, ErrorKind};

/// State of one operation at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub operation_id: String,
    pub resource: ResourceRef,
    pub action: OperationAction,
    pub status: OperationStatus,

    /// Attempts made so far (0 until the operation starts)
    pub attempts: u32,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,

    /// Operation whose failure halted this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_by: Option<String>,
}

impl RunLogEntry {
    /// Fresh pending entry for an operation
    pub fn pending(op: &Operation) -> Self {
        Self {
            operation_id: op.id.clone(),
            resource: op.resource.clone(),
            action: op.action,
            status: OperationStatus::Pending,
            attempts: 0,
            timestamp: Utc::now(),
            error: None,
            halted_by: None,
        }
    }

    /// Copy of this entry moved to a new status
    pub fn with_status(&self, status: OperationStatus) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            ..self.clone()
        }
    }
}

/// User-visible description of a failed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub operation_id: String,
    pub resource: ResourceRef,
    pub kind: ErrorKind,
    pub message: String,

    /// Operations that were not executed because of this failure
    pub halted: Vec<String>,
}

impl std::fmt::Display for FailureReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "operation {} ({}) failed with {}: {}",
            self.operation_id, self.resource, self.kind, self.message
        )?;
        if !self.halted.is_empty() {
            write!(f, "; halted: {}", self.halted.join(", "))?;
        }
        Ok(())
    }
}

/// Result of applying a batch of operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Latest entry per operation, in plan order
    pub entries: Vec<RunLogEntry>,
}

impl RunLog {
    /// Creates a run log with every operation pending
    pub fn new(operations: &[Operation]) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            entries: operations.iter().map(RunLogEntry::pending).collect(),
        }
    }

    /// Rebuilds the latest-per-operation view from an append-only entry stream
    ///
    /// Entries are expected in chronological order; operation order follows
    /// first appearance.
    pub fn from_entries(id: Uuid, entries: impl IntoIterator<Item = RunLogEntry>) -> Self {
        let mut log = Self {
            id,
            started_at: Utc::now(),
            completed_at: None,
            entries: Vec::new(),
        };

        let mut first = true;
        for entry in entries {
            if first {
                log.started_at = entry.timestamp;
                first = false;
            }
            log.record(entry);
        }

        if !log.entries.is_empty() && log.entries.iter().all(|e| e.status.is_terminal()) {
            log.completed_at = log.entries.iter().map(|e| e.timestamp).max();
        }

        log
    }

    /// Replaces the entry of the same operation, or appends a new one
    pub fn record(&mut self, entry: RunLogEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.operation_id == entry.operation_id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn entry(&self, operation_id: &str) -> Option<&RunLogEntry> {
        self.entries.iter().find(|e| e.operation_id == operation_id)
    }

    pub fn status(&self, operation_id: &str) -> Option<OperationStatus> {
        self.entry(operation_id).map(|e| e.status)
    }

    /// Marks the run as finished
    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// True when every operation succeeded
    pub fn is_success(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.status == OperationStatus::Succeeded)
    }

    /// Count of entries in a given status
    pub fn count(&self, status: OperationStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    /// One report per failed operation, with the subtree it halted
    pub fn failures(&self) -> Vec<FailureReport> {
        self.entries
            .iter()
            .filter(|e| e.status == OperationStatus::Failed)
            .map(|failed| {
                let (kind, message) = match &failed.error {
                    Some(detail) => (detail.kind, detail.message.clone()),
                    None => (ErrorKind::Permanent, "unknown error".to_string()),
                };

                FailureReport {
                    operation_id: failed.operation_id.clone(),
                    resource: failed.resource.clone(),
                    kind,
                    message,
                    halted: self
                        .entries
                        .iter()
                        .filter(|e| e.halted_by.as_deref() == Some(failed.operation_id.as_str()))
                        .map(|e| e.operation_id.clone())
                        .collect(),
                }
            })
            .collect()
    }
}
