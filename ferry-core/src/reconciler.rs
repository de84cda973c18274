//! State reconciliation
//!
//! Diffs observed live state against the desired state and returns the
//! smallest operation set that converges the two. The diff is a pure
//! function: no I/O, deterministic, and empty when nothing drifted.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::domain::operation::{Operation, OperationAction};
use crate::domain::resource::{IMAGE_PROPERTY, ObservedResource, ResourceDecl};
use crate::domain::state::{DesiredState, ObservedState};
use crate::error::ValidationError;
use crate::planner;

/// Computes the corrective operations for `observed` to reach `desired`
///
/// Output order is deletes first (dependents before their dependencies),
/// then creates and updates in plan order. Each operation only depends on
/// other operations in the output; prerequisites that already converged are
/// considered satisfied.
///
/// - desired, not observed: `Create`
/// - observed with other properties: `Update`
/// - observed with another kind: `Delete` the old resource, then `Create`
/// - observed, not desired: `Delete`
///
/// An undeclared `image` on a service is left to the pipeline: it never
/// counts as drift and updates keep the deployed one.
pub fn reconcile(
    desired: &DesiredState,
    observed: &ObservedState,
) -> Result<Vec<Operation>, ValidationError> {
    let order = planner::topological_order(desired)?;

    let live: HashMap<&str, &ObservedResource> = observed
        .resources
        .iter()
        .rev()
        .map(|r| (r.name.as_str(), r))
        .collect();

    let desired_names: HashSet<&str> =
        desired.resources.iter().map(|r| r.name.as_str()).collect();

    // Observed resources that must go: undeclared ones and kind changes
    let mut doomed: Vec<&ObservedResource> = Vec::new();
    let mut seen = HashSet::new();
    for resource in &observed.resources {
        if !seen.insert(resource.name.as_str()) {
            continue;
        }
        let replaced = desired
            .resource(&resource.name)
            .is_some_and(|decl| decl.kind != resource.kind);
        if replaced || !desired_names.contains(resource.name.as_str()) {
            doomed.push(resource);
        }
    }

    let mut operations = delete_operations(&doomed);
    let deleted: HashSet<&str> = doomed.iter().map(|r| r.name.as_str()).collect();

    // Creates and updates in plan order
    let mut converging: HashMap<&str, String> = HashMap::new();
    for idx in order {
        let decl = &desired.resources[idx];

        let current = live.get(decl.name.as_str()).copied();
        let action = match current {
            None => OperationAction::Create,
            Some(_) if deleted.contains(decl.name.as_str()) => OperationAction::Create,
            Some(current) if drifted(decl, current) => OperationAction::Update,
            Some(_) => continue,
        };

        let mut op = Operation::for_decl(action, decl);
        if action == OperationAction::Update
            && decl.is_pipeline_owned(IMAGE_PROPERTY)
            && let Some(image) = current.and_then(|c| c.properties.get(IMAGE_PROPERTY))
        {
            op.properties.insert(IMAGE_PROPERTY.to_string(), image.clone());
        }
        let mut seen_deps = HashSet::new();
        op.depends_on = decl
            .depends_on
            .iter()
            .filter(|dep| seen_deps.insert(dep.as_str()))
            .filter_map(|dep| converging.get(dep.as_str()).cloned())
            .collect();
        if deleted.contains(decl.name.as_str()) {
            op.depends_on
                .push(Operation::make_id(OperationAction::Delete, &decl.name));
        }

        converging.insert(decl.name.as_str(), op.id.clone());
        operations.push(op);
    }

    Ok(operations)
}

/// Compares declared properties with live ones, skipping pipeline-owned keys
fn drifted(decl: &ResourceDecl, current: &ObservedResource) -> bool {
    let mut live = current.properties.clone();
    live.retain(|key, _| !decl.is_pipeline_owned(key));
    live != decl.properties
}

/// Orders deletes so that a resource goes only after everything that
/// depended on it; ties go to the highest rank, then latest observed.
fn delete_operations(doomed: &[&ObservedResource]) -> Vec<Operation> {
    let index: HashMap<&str, usize> = doomed
        .iter()
        .enumerate()
        .map(|(idx, r)| (r.name.as_str(), idx))
        .collect();

    // blockers[i] = number of doomed resources that depend on doomed[i]
    let mut blockers = vec![0usize; doomed.len()];
    // releases[i] = doomed resources that doomed[i] depends on
    let mut releases: Vec<Vec<usize>> = vec![Vec::new(); doomed.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); doomed.len()];

    for (idx, resource) in doomed.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &resource.depends_on {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            if let Some(&dep_idx) = index.get(dep.as_str()) {
                if dep_idx != idx {
                    blockers[dep_idx] += 1;
                    releases[idx].push(dep_idx);
                    dependents[dep_idx].push(idx);
                }
            }
        }
    }

    let mut ready: BinaryHeap<(u32, usize)> = blockers
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(idx, _)| (doomed[idx].kind.rank(), idx))
        .collect();

    let mut order = Vec::with_capacity(doomed.len());
    let mut emitted = vec![false; doomed.len()];

    while let Some((_, idx)) = ready.pop() {
        order.push(idx);
        emitted[idx] = true;
        for &dep_idx in &releases[idx] {
            blockers[dep_idx] -= 1;
            if blockers[dep_idx] == 0 {
                ready.push((doomed[dep_idx].kind.rank(), dep_idx));
            }
        }
    }

    // Live state can contain dependency loops; remove those by rank alone
    let mut leftovers: Vec<usize> = (0..doomed.len()).filter(|idx| !emitted[*idx]).collect();
    leftovers.sort_by_key(|idx| Reverse((doomed[*idx].kind.rank(), *idx)));
    order.extend(leftovers);

    let mut position = vec![0usize; doomed.len()];
    for (pos, &idx) in order.iter().enumerate() {
        position[idx] = pos;
    }

    order
        .into_iter()
        .map(|idx| {
            let mut op = Operation::delete(doomed[idx].reference());
            op.depends_on = dependents[idx]
                .iter()
                .filter(|dependent| position[**dependent] < position[idx])
                .map(|dependent| {
                    Operation::make_id(OperationAction::Delete, &doomed[*dependent].name)
                })
                .collect();
            op
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{BuildSpec, ResourceKind};
    use serde_json::json;

    fn ids(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(|op| op.id.as_str()).collect()
    }

    fn shop() -> DesiredState {
        DesiredState::new("shop")
            .with(
                ResourceDecl::new("vpc", ResourceKind::Network)
                    .with_property("cidr", json!("10.0.0.0/16")),
            )
            .with(ResourceDecl::new("eks", ResourceKind::Cluster).depends_on("vpc"))
            .with(ResourceDecl::new("pg", ResourceKind::Database).depends_on("vpc"))
            .with(
                ResourceDecl::new("orders", ResourceKind::Workload)
                    .depends_on("eks")
                    .depends_on("pg")
                    .with_property("replicas", json!(2)),
            )
    }

    #[test]
    fn test_converged_system_needs_no_operations() {
        let desired = shop();
        let observed = ObservedState::from(&desired);

        assert!(reconcile(&desired, &observed).unwrap().is_empty());
    }

    #[test]
    fn test_empty_live_state_reconciles_to_full_plan() {
        let desired = shop();
        let ops = reconcile(&desired, &ObservedState::default()).unwrap();

        assert_eq!(ops, planner::plan(&desired).unwrap());
    }

    #[test]
    fn test_drifted_properties_produce_update_only() {
        let desired = shop();
        let mut observed = ObservedState::from(&desired);
        observed.resources[3]
            .properties
            .insert("replicas".to_string(), json!(1));

        let ops = reconcile(&desired, &observed).unwrap();
        assert_eq!(ids(&ops), vec!["update:orders"]);
        assert!(ops[0].depends_on.is_empty());
        assert_eq!(ops[0].properties["replicas"], json!(2));
    }

    #[test]
    fn test_missing_resource_depends_only_on_converging_prerequisites() {
        let desired = shop();
        let mut observed = ObservedState::from(&desired);
        observed.resources.retain(|r| r.name != "pg" && r.name != "orders");

        let ops = reconcile(&desired, &observed).unwrap();
        assert_eq!(ids(&ops), vec!["create:pg", "create:orders"]);
        assert_eq!(ops[1].depends_on, vec!["create:pg".to_string()]);
    }

    #[test]
    fn test_undeclared_resources_are_deleted_dependents_first() {
        let desired =
            DesiredState::new("shop").with(ResourceDecl::new("vpc", ResourceKind::Network));
        let observed = ObservedState::new(vec![
            ObservedResource::from(&ResourceDecl::new("vpc", ResourceKind::Network)),
            ObservedResource::from(
                &ResourceDecl::new("old-eks", ResourceKind::Cluster).depends_on("vpc"),
            ),
            ObservedResource::from(
                &ResourceDecl::new("legacy", ResourceKind::Workload).depends_on("old-eks"),
            ),
            ObservedResource::from(&ResourceDecl::new("prometheus", ResourceKind::Monitoring)),
        ]);

        let ops = reconcile(&desired, &observed).unwrap();
        assert_eq!(
            ids(&ops),
            vec!["delete:prometheus", "delete:legacy", "delete:old-eks"]
        );
        assert_eq!(ops[2].depends_on, vec!["delete:legacy".to_string()]);
        assert!(ops.iter().all(|op| op.action == OperationAction::Delete));
    }

    #[test]
    fn test_kind_change_replaces_resource() {
        let desired =
            DesiredState::new("shop").with(ResourceDecl::new("cache", ResourceKind::Workload));
        let observed = ObservedState::new(vec![ObservedResource::from(&ResourceDecl::new(
            "cache",
            ResourceKind::Database,
        ))]);

        let ops = reconcile(&desired, &observed).unwrap();
        assert_eq!(ids(&ops), vec!["delete:cache", "create:cache"]);
        assert_eq!(ops[1].depends_on, vec!["delete:cache".to_string()]);
    }

    #[test]
    fn test_reconcile_is_idempotent_after_applying_its_output() {
        let desired = shop();
        let mut observed = ObservedState::new(vec![ObservedResource::from(&ResourceDecl::new(
            "stale",
            ResourceKind::Workload,
        ))]);

        for op in reconcile(&desired, &observed).unwrap() {
            match op.action {
                OperationAction::Delete => {
                    observed.resources.retain(|r| r.name != op.resource.name)
                }
                OperationAction::Create | OperationAction::Update => {
                    let decl = desired.resource(&op.resource.name).unwrap();
                    observed.resources.retain(|r| r.name != decl.name);
                    observed.resources.push(ObservedResource::from(decl));
                }
            }
        }

        assert!(reconcile(&desired, &observed).unwrap().is_empty());
    }

    fn shop_with_service() -> DesiredState {
        DesiredState::new("shop").with(
            ResourceDecl::new("orders", ResourceKind::Workload)
                .with_property("replicas", json!(2))
                .with_build(BuildSpec {
                    context: "services/orders".to_string(),
                    dockerfile: None,
                    repository: "registry.local/orders".to_string(),
                }),
        )
    }

    #[test]
    fn test_deployed_image_is_not_drift() {
        let desired = shop_with_service();
        let mut observed = ObservedState::from(&desired);
        observed.resources[0]
            .properties
            .insert(IMAGE_PROPERTY.to_string(), json!("registry.local/orders:abc"));

        assert!(reconcile(&desired, &observed).unwrap().is_empty());
    }

    #[test]
    fn test_update_keeps_deployed_image() {
        let desired = shop_with_service();
        let mut observed = ObservedState::from(&desired);
        let live = &mut observed.resources[0].properties;
        live.insert("replicas".to_string(), json!(1));
        live.insert(IMAGE_PROPERTY.to_string(), json!("registry.local/orders:abc"));

        let ops = reconcile(&desired, &observed).unwrap();
        assert_eq!(ids(&ops), vec!["update:orders"]);
        assert_eq!(ops[0].properties["replicas"], json!(2));
        assert_eq!(ops[0].properties[IMAGE_PROPERTY], json!("registry.local/orders:abc"));
    }

    #[test]
    fn test_declared_image_is_enforced() {
        let mut desired = shop_with_service();
        desired.resources[0]
            .properties
            .insert(IMAGE_PROPERTY.to_string(), json!("registry.local/orders:pinned"));
        let mut observed = ObservedState::from(&desired);
        observed.resources[0]
            .properties
            .insert(IMAGE_PROPERTY.to_string(), json!("registry.local/orders:abc"));

        let ops = reconcile(&desired, &observed).unwrap();
        assert_eq!(ids(&ops), vec!["update:orders"]);
        assert_eq!(ops[0].properties[IMAGE_PROPERTY], json!("registry.local/orders:pinned"));
    }

    #[test]
    fn test_image_on_a_plain_workload_is_drift() {
        let desired = shop();
        let mut observed = ObservedState::from(&desired);
        observed.resources[3]
            .properties
            .insert(IMAGE_PROPERTY.to_string(), json!("nginx:1.27"));

        let ops = reconcile(&desired, &observed).unwrap();
        assert_eq!(ids(&ops), vec!["update:orders"]);
        assert!(!ops[0].properties.contains_key(IMAGE_PROPERTY));
    }

    #[test]
    fn test_invalid_desired_state_is_rejected() {
        let desired = DesiredState::new("shop")
            .with(ResourceDecl::new("eks", ResourceKind::Cluster).depends_on("vpc"));

        assert!(matches!(
            reconcile(&desired, &ObservedState::default()),
            Err(ValidationError::MissingDependency { .. })
        ));
    }
}
