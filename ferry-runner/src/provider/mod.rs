//! Provider layer
//!
//! Providers are the seam between the runner and external systems (cloud
//! APIs, cluster control plane, database provisioning, monitoring
//! installers). The executor only ever talks to a `ResourceProvider`.

mod hook;
#[cfg(test)]
mod memory;

pub use hook::HookProvider;
#[cfg(test)]
pub use memory::MemoryProvider;

use async_trait::async_trait;
use ferry_core::domain::operation::Operation;
use ferry_core::domain::state::{DesiredState, ObservedState};
use ferry_core::error::OperationError;

/// Access to live resources
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Reports the live resources relevant to a desired state
    ///
    /// This includes live resources the desired state no longer declares, so
    /// that reconciliation can delete them.
    async fn observe(&self, desired: &DesiredState) -> Result<ObservedState, OperationError>;

    /// Applies one idempotent operation
    async fn apply(&self, operation: &Operation) -> Result<(), OperationError>;
}
