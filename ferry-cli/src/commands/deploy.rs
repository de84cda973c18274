//! Deploy command handlers
//!
//! Queues Apply and Reconcile deployments and inspects their run logs.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use ferry_client::OrchestratorClient;
use ferry_core::domain::deployment::{Deployment, DeploymentMode, DeploymentStatus};
use ferry_core::domain::run_log::RunLog;
use ferry_core::dto::deployment::CreateDeployment;
use uuid::Uuid;

use crate::config::Config;
use crate::display::{
    colorize_deployment_status, duration_secs, print_operations, print_run_log, timestamp,
};
use crate::id_resolver::{resolve_deployment_id, resolve_stack_id};

const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Deploy subcommands
#[derive(Subcommand)]
pub enum DeployCommands {
    /// Apply every planned operation of a stack
    Apply {
        /// Stack name, ID or unambiguous ID prefix
        stack: String,

        /// Wait for the deployment to finish and print its run log
        #[arg(short, long)]
        wait: bool,
    },
    /// Converge a stack against its live state
    Reconcile {
        /// Stack name, ID or unambiguous ID prefix
        stack: String,

        /// Only compute the corrective operations
        #[arg(long)]
        dry_run: bool,

        /// Wait for the deployment to finish and print its run log
        #[arg(short, long)]
        wait: bool,
    },
    /// Show deployment details
    Get {
        /// Deployment ID or unambiguous prefix
        id: String,
    },
    /// List deployments of a stack
    List {
        /// Stack name, ID or unambiguous ID prefix
        stack: String,
    },
    /// Show the run log of a deployment
    Logs {
        /// Deployment ID or unambiguous prefix
        id: String,
    },
    /// Cancel a queued deployment
    Cancel {
        /// Deployment ID or unambiguous prefix
        id: String,
    },
}

/// Handle deploy commands
pub async fn handle_deploy_command(command: DeployCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        DeployCommands::Apply { stack, wait } => {
            launch(&client, &stack, DeploymentMode::Apply, wait).await
        }
        DeployCommands::Reconcile {
            stack,
            dry_run,
            wait,
        } => launch(&client, &stack, DeploymentMode::Reconcile { dry_run }, wait).await,
        DeployCommands::Get { id } => get_deployment(&client, &id).await,
        DeployCommands::List { stack } => list_deployments(&client, &stack).await,
        DeployCommands::Logs { id } => show_run_log(&client, &id).await,
        DeployCommands::Cancel { id } => cancel_deployment(&client, &id).await,
    }
}

async fn launch(
    client: &OrchestratorClient,
    stack: &str,
    mode: DeploymentMode,
    wait: bool,
) -> Result<()> {
    let stack_id = resolve_stack_id(client, stack).await?;

    let deployment = match client
        .launch_deployment(CreateDeployment { stack_id, mode })
        .await
    {
        Ok(deployment) => deployment,
        Err(err) if err.is_conflict() => {
            println!("{} {}", "⚠".yellow(), err.to_string().yellow());
            bail!("Wait for the active deployment of {} to finish first", stack);
        }
        Err(err) => return Err(err.into()),
    };

    println!("{}", "✓ Deployment queued successfully!".green().bold());
    println!("  ID:         {}", deployment.id.to_string().cyan());
    println!("  Mode:       {}", deployment.mode);
    println!(
        "  Operations: {}",
        match deployment.mode {
            DeploymentMode::Apply => deployment.operations.len().to_string(),
            DeploymentMode::Reconcile { .. } => "computed by the runner".to_string(),
        }
        .dimmed()
    );

    if !wait {
        return Ok(());
    }

    println!();
    println!("{}", "Waiting for a runner...".dimmed());
    let finished = wait_for_completion(client, deployment.id).await?;

    print_deployment_details(&finished);
    let entries = client.get_run_log(finished.id).await?;
    if !entries.is_empty() {
        println!("\n{}", "Run Log:".bold());
        print_run_log(&RunLog::from_entries(finished.id, entries));
    }

    if finished.status == DeploymentStatus::Failed {
        bail!("Deployment {} failed", finished.id);
    }

    Ok(())
}

async fn wait_for_completion(client: &OrchestratorClient, id: Uuid) -> Result<Deployment> {
    let mut last_status = None;

    loop {
        let deployment = client.get_deployment(id).await?;

        if last_status != Some(deployment.status) {
            println!(
                "  {} {}",
                "▸".cyan(),
                colorize_deployment_status(deployment.status)
            );
            last_status = Some(deployment.status);
        }

        if !deployment.status.is_active() {
            return Ok(deployment);
        }

        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}

async fn get_deployment(client: &OrchestratorClient, input: &str) -> Result<()> {
    let id = resolve_deployment_id(client, input).await?;
    let deployment = client.get_deployment(id).await?;

    print_deployment_details(&deployment);

    Ok(())
}

async fn list_deployments(client: &OrchestratorClient, stack: &str) -> Result<()> {
    let stack_id = resolve_stack_id(client, stack).await?;
    let deployments = client.list_deployments_by_stack(stack_id).await?;

    if deployments.is_empty() {
        println!(
            "{}",
            format!("No deployments found for stack {}.", stack).yellow()
        );
    } else {
        println!(
            "{}",
            format!(
                "Found {} deployment(s) for stack {}:",
                deployments.len(),
                stack
            )
            .bold()
        );
        println!();
        for deployment in deployments {
            print_deployment_summary(&deployment);
        }
    }

    Ok(())
}

async fn show_run_log(client: &OrchestratorClient, input: &str) -> Result<()> {
    let id = resolve_deployment_id(client, input).await?;
    let entries = client.get_run_log(id).await?;

    if entries.is_empty() {
        println!("{}", "No run log entries for this deployment.".yellow());
        return Ok(());
    }

    let log = RunLog::from_entries(id, entries);

    println!("{}", format!("Run log for deployment {}:", id).bold());
    println!("{}", "─".repeat(80).dimmed());
    print_run_log(&log);
    println!("{}", "─".repeat(80).dimmed());

    Ok(())
}

async fn cancel_deployment(client: &OrchestratorClient, input: &str) -> Result<()> {
    let id = resolve_deployment_id(client, input).await?;

    client.cancel_deployment(id).await?;

    println!(
        "{}",
        format!("✓ Deployment {} cancelled.", id).green().bold()
    );

    Ok(())
}

fn print_deployment_summary(deployment: &Deployment) {
    println!(
        "  {} Deployment {}",
        "▸".cyan(),
        deployment.id.to_string().dimmed()
    );
    println!("    Mode:      {}", deployment.mode);
    println!(
        "    Status:    {}",
        colorize_deployment_status(deployment.status)
    );
    println!(
        "    Requested: {}",
        timestamp(&deployment.requested_at).dimmed()
    );
    if let Some(runner) = &deployment.runner_id {
        println!("    Runner:    {}", runner.dimmed());
    }
    println!();
}

fn print_deployment_details(deployment: &Deployment) {
    println!("{}", "Deployment Details:".bold());
    println!("  ID:        {}", deployment.id.to_string().cyan());
    println!("  Stack ID:  {}", deployment.stack_id.to_string().dimmed());
    println!("  Mode:      {}", deployment.mode);
    println!(
        "  Status:    {}",
        colorize_deployment_status(deployment.status)
    );
    println!("  Requested: {}", timestamp(&deployment.requested_at));

    if let Some(started) = &deployment.started_at {
        println!("  Started:   {}", timestamp(started));
    }
    if let Some(completed) = &deployment.completed_at {
        println!("  Completed: {}", timestamp(completed));
    }
    if let Some(seconds) = duration_secs(deployment.started_at, deployment.completed_at) {
        println!("  Duration:  {}s", seconds);
    }
    if let Some(runner) = &deployment.runner_id {
        println!("  Runner:    {}", runner);
    }

    println!("\n{}", "Operations:".bold());
    let pending_diff = matches!(deployment.mode, DeploymentMode::Reconcile { .. })
        && deployment.status == DeploymentStatus::Queued;
    if pending_diff {
        println!("{}", "  Not computed yet: the runner diffs live state on claim.".dimmed());
    } else {
        print_operations(&deployment.operations);
    }

    if let Some(error) = &deployment.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}
