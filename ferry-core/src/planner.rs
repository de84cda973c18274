//! Resource planner
//!
//! Turns a desired state into the ordered list of operations that brings an
//! empty environment up to it. Ordering is a topological sort over declared
//! `depends_on` edges; among resources that are ready at the same time the
//! lowest rank wins, then declaration order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::domain::operation::{Operation, OperationAction};
use crate::domain::resource::ResourceKind;
use crate::domain::state::DesiredState;
use crate::error::ValidationError;

const MAX_NAME_LENGTH: usize = 63;

/// Computes the ordered operation sequence for a desired state
///
/// Every operation is a `Create` (create-or-update) whose `depends_on` holds
/// the operation ids of the resource's declared dependencies.
///
/// # Errors
/// Returns a [`ValidationError`] for malformed names, duplicates, missing or
/// rank-inverted dependency references, and cycles.
pub fn plan(desired: &DesiredState) -> Result<Vec<Operation>, ValidationError> {
    let order = topological_order(desired)?;

    let operations = order
        .into_iter()
        .map(|idx| {
            let decl = &desired.resources[idx];
            let mut op = Operation::for_decl(OperationAction::Create, decl);
            op.depends_on = unique(&decl.depends_on)
                .into_iter()
                .map(|dep| Operation::make_id(OperationAction::Create, dep))
                .collect();
            op
        })
        .collect();

    Ok(operations)
}

/// Validates a desired state without producing a plan
pub fn validate(desired: &DesiredState) -> Result<(), ValidationError> {
    topological_order(desired).map(|_| ())
}

/// Returns declaration indexes in execution order
pub(crate) fn topological_order(desired: &DesiredState) -> Result<Vec<usize>, ValidationError> {
    let index = validate_declarations(desired)?;
    let resources = &desired.resources;

    let mut in_degree = vec![0usize; resources.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); resources.len()];

    for (idx, decl) in resources.iter().enumerate() {
        for dep in unique(&decl.depends_on) {
            let dep_idx = index[dep];
            in_degree[idx] += 1;
            dependents[dep_idx].push(idx);
        }
    }

    let mut ready: BinaryHeap<Reverse<(u32, usize)>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(idx, _)| Reverse((resources[idx].kind.rank(), idx)))
        .collect();

    let mut order = Vec::with_capacity(resources.len());

    while let Some(Reverse((_, idx))) = ready.pop() {
        order.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse((resources[dependent].kind.rank(), dependent)));
            }
        }
    }

    if order.len() < resources.len() {
        return Err(ValidationError::Cycle(cycle_members(
            desired,
            &in_degree,
            &dependents,
        )));
    }

    Ok(order)
}

/// Checks names and references, returning a name -> index map
fn validate_declarations(desired: &DesiredState) -> Result<HashMap<&str, usize>, ValidationError> {
    if desired.name.trim().is_empty() {
        return Err(ValidationError::EmptyStateName);
    }

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(desired.resources.len());

    for (idx, decl) in desired.resources.iter().enumerate() {
        if !is_valid_name(&decl.name) {
            return Err(ValidationError::InvalidName(decl.name.clone()));
        }
        if index.insert(decl.name.as_str(), idx).is_some() {
            return Err(ValidationError::DuplicateResource(decl.name.clone()));
        }
    }

    for decl in &desired.resources {
        for dep in &decl.depends_on {
            if dep == &decl.name {
                return Err(ValidationError::SelfDependency(decl.name.clone()));
            }

            let dep_decl = index
                .get(dep.as_str())
                .map(|&i| &desired.resources[i])
                .ok_or_else(|| ValidationError::MissingDependency {
                    resource: decl.name.clone(),
                    dependency: dep.clone(),
                })?;

            if dep_decl.kind.rank() > decl.kind.rank() {
                return Err(ValidationError::RankInversion {
                    resource: decl.name.clone(),
                    kind: decl.kind,
                    dependency: dep.clone(),
                    dependency_kind: dep_decl.kind,
                });
            }
        }

        if decl.build.is_some() && decl.kind != ResourceKind::Workload {
            return Err(ValidationError::BuildOnNonWorkload(decl.name.clone()));
        }
    }

    Ok(index)
}

/// Resources left unsorted, minus the tails that merely hang off a cycle
fn cycle_members(
    desired: &DesiredState,
    in_degree: &[usize],
    dependents: &[Vec<usize>],
) -> Vec<String> {
    let mut remaining: HashSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree > 0)
        .map(|(idx, _)| idx)
        .collect();

    loop {
        let tails: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|idx| !dependents[*idx].iter().any(|d| remaining.contains(d)))
            .collect();
        if tails.is_empty() {
            break;
        }
        for idx in tails {
            remaining.remove(&idx);
        }
    }

    let mut members: Vec<usize> = remaining.into_iter().collect();
    members.sort_unstable();
    members
        .into_iter()
        .map(|idx| desired.resources[idx].name.clone())
        .collect()
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Dependencies with repeats removed, first occurrence kept
fn unique(deps: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    deps.iter()
        .map(String::as_str)
        .filter(|dep| seen.insert(*dep))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::{BuildSpec, ResourceDecl};

    fn ids(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(|op| op.id.as_str()).collect()
    }

    fn shop() -> DesiredState {
        DesiredState::new("shop")
            .with(ResourceDecl::new("grafana", ResourceKind::Monitoring).depends_on("eks"))
            .with(
                ResourceDecl::new("orders", ResourceKind::Workload)
                    .depends_on("eks")
                    .depends_on("pg"),
            )
            .with(ResourceDecl::new("pg", ResourceKind::Database).depends_on("vpc"))
            .with(ResourceDecl::new("eks", ResourceKind::Cluster).depends_on("vpc"))
            .with(ResourceDecl::new("vpc", ResourceKind::Network))
            .with(ResourceDecl::new("users", ResourceKind::Workload).depends_on("eks"))
    }

    #[test]
    fn test_network_before_cluster() {
        let state = DesiredState::new("shop")
            .with(ResourceDecl::new("vpc", ResourceKind::Network))
            .with(ResourceDecl::new("eks", ResourceKind::Cluster).depends_on("vpc"));

        let ops = plan(&state).unwrap();
        assert_eq!(ids(&ops), vec!["create:vpc", "create:eks"]);
        assert_eq!(ops[1].depends_on, vec!["create:vpc".to_string()]);
    }

    #[test]
    fn test_ties_broken_by_rank_then_declaration_order() {
        let ops = plan(&shop()).unwrap();
        assert_eq!(
            ids(&ops),
            vec![
                "create:vpc",
                "create:eks",
                "create:pg",
                "create:orders",
                "create:users",
                "create:grafana",
            ]
        );
    }

    #[test]
    fn test_plan_respects_every_declared_edge() {
        let state = shop();
        let ops = plan(&state).unwrap();
        let position: HashMap<&str, usize> = ops
            .iter()
            .enumerate()
            .map(|(i, op)| (op.resource.name.as_str(), i))
            .collect();

        assert_eq!(ops.len(), state.resources.len());
        for decl in &state.resources {
            for dep in &decl.depends_on {
                assert!(position[dep.as_str()] < position[decl.name.as_str()]);
            }
        }
    }

    #[test]
    fn test_independent_resources_keep_declaration_order() {
        let state = DesiredState::new("shop")
            .with(ResourceDecl::new("b", ResourceKind::Workload))
            .with(ResourceDecl::new("a", ResourceKind::Workload))
            .with(ResourceDecl::new("c", ResourceKind::Workload));

        assert_eq!(
            ids(&plan(&state).unwrap()),
            vec!["create:b", "create:a", "create:c"]
        );
    }

    #[test]
    fn test_same_rank_dependency_is_allowed() {
        let state = DesiredState::new("shop")
            .with(ResourceDecl::new("api", ResourceKind::Workload).depends_on("auth"))
            .with(ResourceDecl::new("auth", ResourceKind::Workload));

        assert_eq!(
            ids(&plan(&state).unwrap()),
            vec!["create:auth", "create:api"]
        );
    }

    #[test]
    fn test_repeated_dependency_is_collapsed() {
        let state = DesiredState::new("shop")
            .with(ResourceDecl::new("vpc", ResourceKind::Network))
            .with(
                ResourceDecl::new("eks", ResourceKind::Cluster)
                    .depends_on("vpc")
                    .depends_on("vpc"),
            );

        let ops = plan(&state).unwrap();
        assert_eq!(ops[1].depends_on, vec!["create:vpc".to_string()]);
    }

    #[test]
    fn test_empty_state_plans_nothing() {
        assert!(plan(&DesiredState::new("empty")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_dependency_is_rejected() {
        let state = DesiredState::new("shop")
            .with(ResourceDecl::new("eks", ResourceKind::Cluster).depends_on("vpc"));

        assert_eq!(
            plan(&state),
            Err(ValidationError::MissingDependency {
                resource: "eks".to_string(),
                dependency: "vpc".to_string(),
            })
        );
    }

    #[test]
    fn test_cycle_is_rejected_with_members() {
        let state = DesiredState::new("shop")
            .with(ResourceDecl::new("vpc", ResourceKind::Network))
            .with(
                ResourceDecl::new("a", ResourceKind::Workload)
                    .depends_on("c")
                    .depends_on("vpc"),
            )
            .with(ResourceDecl::new("b", ResourceKind::Workload).depends_on("a"))
            .with(ResourceDecl::new("c", ResourceKind::Workload).depends_on("b"))
            .with(ResourceDecl::new("tail", ResourceKind::Workload).depends_on("c"));

        assert_eq!(
            plan(&state),
            Err(ValidationError::Cycle(vec![
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
            ]))
        );
    }

    #[test]
    fn test_duplicate_and_invalid_names_are_rejected() {
        let dup = DesiredState::new("shop")
            .with(ResourceDecl::new("vpc", ResourceKind::Network))
            .with(ResourceDecl::new("vpc", ResourceKind::Network));
        assert_eq!(
            validate(&dup),
            Err(ValidationError::DuplicateResource("vpc".to_string()))
        );

        let too_long = "a".repeat(64);
        for bad in ["", "Vpc", "-vpc", "vpc-", "vpc_main", too_long.as_str()] {
            let state =
                DesiredState::new("shop").with(ResourceDecl::new(bad, ResourceKind::Network));
            assert_eq!(
                validate(&state),
                Err(ValidationError::InvalidName(bad.to_string()))
            );
        }

        assert_eq!(
            validate(&DesiredState::new("  ")),
            Err(ValidationError::EmptyStateName)
        );
    }

    #[test]
    fn test_self_dependency_and_rank_inversion_are_rejected() {
        let selfish = DesiredState::new("shop")
            .with(ResourceDecl::new("vpc", ResourceKind::Network).depends_on("vpc"));
        assert_eq!(
            validate(&selfish),
            Err(ValidationError::SelfDependency("vpc".to_string()))
        );

        let inverted = DesiredState::new("shop")
            .with(ResourceDecl::new("vpc", ResourceKind::Network).depends_on("eks"))
            .with(ResourceDecl::new("eks", ResourceKind::Cluster));
        assert!(matches!(
            validate(&inverted),
            Err(ValidationError::RankInversion { .. })
        ));
    }

    #[test]
    fn test_build_spec_only_on_workloads() {
        let state = DesiredState::new("shop").with(
            ResourceDecl::new("pg", ResourceKind::Database).with_build(BuildSpec {
                context: ".".to_string(),
                dockerfile: None,
                repository: "registry/pg".to_string(),
            }),
        );

        assert_eq!(
            validate(&state),
            Err(ValidationError::BuildOnNonWorkload("pg".to_string()))
        );
    }
}
