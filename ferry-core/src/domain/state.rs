//! Desired and observed state

use serde::{Deserialize, Serialize};

use super::resource::{ObservedResource, ResourceDecl, ResourceKind};

/// Declarative target configuration of infrastructure and workloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredState {
    /// Environment name (e.g. `shop-production`)
    pub name: String,

    /// Resource declarations in declaration order
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

impl DesiredState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
        }
    }

    /// Appends a declaration
    pub fn with(mut self, decl: ResourceDecl) -> Self {
        self.resources.push(decl);
        self
    }

    /// Looks up a declaration by name
    pub fn resource(&self, name: &str) -> Option<&ResourceDecl> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Workloads that carry a build spec, i.e. services a pipeline can run for
    pub fn services(&self) -> impl Iterator<Item = &ResourceDecl> {
        self.resources
            .iter()
            .filter(|r| r.kind == ResourceKind::Workload && r.build.is_some())
    }
}

/// Live resources as reported by a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    #[serde(default)]
    pub resources: Vec<ObservedResource>,
}

impl ObservedState {
    pub fn new(resources: Vec<ObservedResource>) -> Self {
        Self { resources }
    }

    pub fn resource(&self, name: &str) -> Option<&ObservedResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl From<&DesiredState> for ObservedState {
    /// The observed state of a fully converged system
    fn from(desired: &DesiredState) -> Self {
        Self {
            resources: desired.resources.iter().map(ObservedResource::from).collect(),
        }
    }
}
