//! Resource domain types
//!
//! A resource is one declared piece of the environment: a network, a cluster,
//! a managed database, a service workload or the monitoring stack.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Property bag attached to declared and observed resources
pub type Properties = BTreeMap<String, JsonValue>;

/// Property the pipeline sets on a service when it deploys a pushed image
pub const IMAGE_PROPERTY: &str = "image";

/// Kind tag of a declared resource
///
/// Variants are listed in dependency rank order: a resource may only depend
/// on resources of the same or a lower rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Network,
    Cluster,
    Database,
    Workload,
    Monitoring,
}

impl ResourceKind {
    /// All kinds, lowest rank first
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Network,
        ResourceKind::Cluster,
        ResourceKind::Database,
        ResourceKind::Workload,
        ResourceKind::Monitoring,
    ];

    /// Dependency rank (network = 0 ... monitoring = 4)
    pub fn rank(self) -> u32 {
        match self {
            ResourceKind::Network => 0,
            ResourceKind::Cluster => 1,
            ResourceKind::Database => 2,
            ResourceKind::Workload => 3,
            ResourceKind::Monitoring => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Cluster => "cluster",
            ResourceKind::Database => "database",
            ResourceKind::Workload => "workload",
            ResourceKind::Monitoring => "monitoring",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind '{}'", s))
    }
}

/// How to build the container image of a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context directory
    pub context: String,

    /// Dockerfile path relative to the context (defaults to `Dockerfile`)
    #[serde(default)]
    pub dockerfile: Option<String>,

    /// Image repository to tag and push to (e.g. `registry.example.com/orders`)
    pub repository: String,
}

/// A single declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Unique name within the desired state
    pub name: String,

    pub kind: ResourceKind,

    /// Names of resources that must exist before this one
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Provider-specific configuration
    #[serde(default)]
    pub properties: Properties,

    /// Present on workloads that are built by a pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
}

impl ResourceDecl {
    /// Creates a declaration with no dependencies or properties
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            depends_on: Vec::new(),
            properties: Properties::new(),
            build: None,
        }
    }

    /// Adds a dependency on another declared resource
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Sets a single property
    pub fn with_property(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Attaches a build spec
    pub fn with_build(mut self, build: BuildSpec) -> Self {
        self.build = Some(build);
        self
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            name: self.name.clone(),
            kind: self.kind,
        }
    }

    /// Whether `key` is set by deploys rather than by this declaration
    ///
    /// A service that leaves `image` undeclared runs whatever its last
    /// pipeline run deployed.
    pub fn is_pipeline_owned(&self, key: &str) -> bool {
        self.build.is_some() && key == IMAGE_PROPERTY && !self.properties.contains_key(key)
    }
}

/// Reference to a resource by name and kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,
    pub kind: ResourceKind,
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// A resource as reported live by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedResource {
    pub name: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ObservedResource {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            name: self.name.clone(),
            kind: self.kind,
        }
    }
}

impl From<&ResourceDecl> for ObservedResource {
    fn from(decl: &ResourceDecl) -> Self {
        Self {
            name: decl.name.clone(),
            kind: decl.kind,
            properties: decl.properties.clone(),
            depends_on: decl.depends_on.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_follows_declaration_order() {
        let ranks: Vec<u32> = ResourceKind::ALL.iter().map(|k| k.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
        }
        assert!("vpc".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_decl_deserializes_with_defaults() {
        let decl: ResourceDecl =
            serde_json::from_str(r#"{ "name": "vpc", "kind": "network" }"#).unwrap();
        assert_eq!(decl.kind, ResourceKind::Network);
        assert!(decl.depends_on.is_empty());
        assert!(decl.properties.is_empty());
        assert!(decl.build.is_none());
    }
}
