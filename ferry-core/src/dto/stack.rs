//! Stack DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::stack::Stack;
use crate::domain::state::DesiredState;

/// Request to register a desired state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStack {
    pub desired: DesiredState,

    /// Enqueue periodic reconciliation for this stack
    #[serde(default)]
    pub auto_reconcile: bool,
}

/// Request to replace a stack's desired state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStack {
    pub desired: DesiredState,

    /// Leave unchanged when absent
    #[serde(default)]
    pub auto_reconcile: Option<bool>,
}

/// Summary information about a stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSummary {
    pub id: Uuid,
    pub name: String,

    /// Number of declared resources
    pub resource_count: usize,

    /// Number of pipeline-buildable services
    pub service_count: usize,

    pub auto_reconcile: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<Stack> for StackSummary {
    fn from(stack: Stack) -> Self {
        StackSummary {
            id: stack.id,
            service_count: stack.desired.services().count(),
            resource_count: stack.desired.resources.len(),
            name: stack.name,
            auto_reconcile: stack.auto_reconcile,
            updated_at: stack.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{BuildSpec, ResourceDecl, ResourceKind};

    #[test]
    fn test_summary_counts_resources_and_services() {
        let desired = DesiredState::new("shop")
            .with(ResourceDecl::new("vpc", ResourceKind::Network))
            .with(ResourceDecl::new("orders", ResourceKind::Workload).with_build(BuildSpec {
                context: "services/orders".to_string(),
                dockerfile: None,
                repository: "registry.local/orders".to_string(),
            }))
            .with(ResourceDecl::new("redis", ResourceKind::Workload));
        let now = Utc::now();
        let stack = Stack {
            id: Uuid::new_v4(),
            name: "shop".to_string(),
            desired,
            auto_reconcile: true,
            created_at: now,
            updated_at: now,
        };

        let summary = StackSummary::from(stack);
        assert_eq!(summary.resource_count, 3);
        assert_eq!(summary.service_count, 1);
        assert!(summary.auto_reconcile);
    }

    #[test]
    fn test_create_stack_defaults_auto_reconcile_off() {
        let request: CreateStack =
            serde_json::from_str(r#"{ "desired": { "name": "shop", "resources": [] } }"#).unwrap();
        assert!(!request.auto_reconcile);
    }
}
