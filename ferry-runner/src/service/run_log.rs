//! Run-log sinks
//!
//! The executor reports every run-log transition to a sink. The runner uses
//! a buffer that is drained periodically and sent to the orchestrator.

use ferry_core::domain::run_log::RunLogEntry;
use std::sync::{Arc, Mutex, PoisonError};

/// Destination for run-log entries produced by the executor
pub trait RunLogSink: Send + Sync {
    /// Records one entry
    fn record(&self, entry: RunLogEntry);
}

/// Thread-safe in-memory buffer of run-log entries
///
/// Uses Arc<Mutex<Vec<RunLogEntry>>> for access across tasks. Clones share
/// the same buffer.
#[derive(Clone, Default)]
pub struct RunLogBuffer {
    buffer: Arc<Mutex<Vec<RunLogEntry>>>,
}

impl RunLogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all buffered entries and clears the buffer
    pub fn drain(&self) -> Vec<RunLogEntry> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.drain(..).collect()
    }

    /// Copy of the buffered entries
    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<RunLogEntry> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RunLogSink for RunLogBuffer {
    fn record(&self, entry: RunLogEntry) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::operation::{Operation, OperationAction, OperationStatus};
    use ferry_core::domain::resource::{ResourceDecl, ResourceKind};

    #[test]
    fn test_drain_empties_shared_buffer() {
        let op = Operation::for_decl(
            OperationAction::Create,
            &ResourceDecl::new("vpc", ResourceKind::Network),
        );
        let buffer = RunLogBuffer::new();
        let writer = buffer.clone();

        writer.record(RunLogEntry::pending(&op));
        writer.record(RunLogEntry::pending(&op).with_status(OperationStatus::Running));

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].status, OperationStatus::Running);
        assert!(buffer.drain().is_empty());
    }
}
