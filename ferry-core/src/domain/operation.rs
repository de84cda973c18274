//! Operation domain types

use serde::{Deserialize, Serialize};

use super::resource::{Properties, ResourceDecl, ResourceRef};

/// What an operation does to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationAction {
    Create,
    Update,
    Delete,
}

impl OperationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationAction::Create => "create",
            OperationAction::Update => "update",
            OperationAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single idempotent action against one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Deterministic id, `<action>:<resource name>`
    pub id: String,

    pub action: OperationAction,

    pub resource: ResourceRef,

    /// Dependency rank of the resource kind
    pub rank: u32,

    /// Ids of operations that must succeed first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Properties to converge to (empty for deletes)
    #[serde(default)]
    pub properties: Properties,
}

impl Operation {
    /// Builds the id for an action on a named resource
    pub fn make_id(action: OperationAction, name: &str) -> String {
        format!("{}:{}", action, name)
    }

    /// Creates a create/update operation from a declaration
    ///
    /// `depends_on` is left empty; the planner fills it in.
    pub fn for_decl(action: OperationAction, decl: &ResourceDecl) -> Self {
        Self {
            id: Self::make_id(action, &decl.name),
            action,
            resource: decl.reference(),
            rank: decl.kind.rank(),
            depends_on: Vec::new(),
            properties: decl.properties.clone(),
        }
    }

    /// Creates a delete operation for a resource
    pub fn delete(resource: ResourceRef) -> Self {
        Self {
            id: Self::make_id(OperationAction::Delete, &resource.name),
            action: OperationAction::Delete,
            rank: resource.kind.rank(),
            resource,
            depends_on: Vec::new(),
            properties: Properties::new(),
        }
    }
}

/// Execution status of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never ran because a prerequisite failed
    Halted,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Succeeded | OperationStatus::Failed | OperationStatus::Halted
        )
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "Pending"),
            OperationStatus::Running => write!(f, "Running"),
            OperationStatus::Succeeded => write!(f, "Succeeded"),
            OperationStatus::Failed => write!(f, "Failed"),
            OperationStatus::Halted => write!(f, "Halted"),
        }
    }
}
