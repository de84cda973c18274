//! ID resolver module
//!
//! Resolves UUID prefixes (and stack names) to full UUIDs by querying the
//! orchestrator, so users can type `3f2a` instead of a whole UUID.

use anyhow::{Context, Result, anyhow, bail};
use ferry_client::OrchestratorClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a stack name, ID or ID prefix
pub async fn resolve_stack_id(client: &OrchestratorClient, input: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(input.trim()) {
        return Ok(uuid);
    }

    let stacks = client
        .list_stacks()
        .await
        .context("Failed to fetch stacks for ID resolution")?;

    if let Some(stack) = stacks.iter().find(|s| s.name == input) {
        return Ok(stack.id);
    }

    let id_or_prefix = IdOrPrefix::parse(input)
        .map_err(|_| anyhow!("No stack named '{}'", input))?;
    resolve_unique(&id_or_prefix, stacks.iter().map(|s| s.id), "stack")
}

/// Resolve a deployment ID or prefix across all stacks
pub async fn resolve_deployment_id(client: &OrchestratorClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input)?;
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let mut ids = Vec::new();
    for stack in client
        .list_stacks()
        .await
        .context("Failed to fetch stacks for ID resolution")?
    {
        let deployments = client
            .list_deployments_by_stack(stack.id)
            .await
            .with_context(|| format!("Failed to fetch deployments of stack {}", stack.name))?;
        ids.extend(deployments.into_iter().map(|d| d.id));
    }

    resolve_unique(&id_or_prefix, ids, "deployment")
}

/// Resolve a pipeline run ID or prefix across all stacks
pub async fn resolve_pipeline_run_id(client: &OrchestratorClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input)?;
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let mut ids = Vec::new();
    for stack in client
        .list_stacks()
        .await
        .context("Failed to fetch stacks for ID resolution")?
    {
        let runs = client
            .list_pipeline_runs_by_stack(stack.id)
            .await
            .with_context(|| format!("Failed to fetch pipeline runs of stack {}", stack.name))?;
        ids.extend(runs.into_iter().map(|r| r.id));
    }

    resolve_unique(&id_or_prefix, ids, "pipeline run")
}

/// Picks the single candidate matching `id_or_prefix`
fn resolve_unique(
    id_or_prefix: &IdOrPrefix,
    candidates: impl IntoIterator<Item = Uuid>,
    what: &str,
) -> Result<Uuid> {
    let mut matches: Vec<Uuid> = candidates
        .into_iter()
        .filter(|id| id_or_prefix.matches(id))
        .collect();
    matches.sort();
    matches.dedup();

    match matches.as_slice() {
        [] => bail!("No {} found with ID starting with '{}'", what, id_or_prefix),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|id| id.to_string()).collect();
            bail!(
                "Ambiguous prefix '{}' matches multiple {}s: {}",
                id_or_prefix,
                what,
                ids.join(", ")
            )
        }
    }
}
