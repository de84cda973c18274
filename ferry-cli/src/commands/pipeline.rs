//! Pipeline command handlers
//!
//! Launches and inspects per-service build, push and deploy runs.

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use ferry_client::OrchestratorClient;
use ferry_core::domain::pipeline::PipelineRun;
use ferry_core::dto::pipeline::CreatePipelineRun;

use crate::config::Config;
use crate::display::{colorize_pipeline_status, stage_marker, timestamp};
use crate::id_resolver::{resolve_pipeline_run_id, resolve_stack_id};

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Build, push and deploy one or more services of a stack
    Run {
        /// Stack name, ID or unambiguous ID prefix
        stack: String,

        /// Services to deliver (workloads with a build spec)
        #[arg(required = true)]
        services: Vec<String>,

        /// Image tag (defaults to a prefix of the run ID)
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Show pipeline run details
    Get {
        /// Pipeline run ID or unambiguous prefix
        id: String,
    },
    /// List pipeline runs of a stack
    List {
        /// Stack name, ID or unambiguous ID prefix
        stack: String,
    },
}

/// Handle pipeline commands
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        PipelineCommands::Run {
            stack,
            services,
            tag,
        } => run_pipelines(&client, &stack, services, tag).await,
        PipelineCommands::Get { id } => get_pipeline_run(&client, &id).await,
        PipelineCommands::List { stack } => list_pipeline_runs(&client, &stack).await,
    }
}

/// Launch one run per service; runs proceed independently
async fn run_pipelines(
    client: &OrchestratorClient,
    stack: &str,
    services: Vec<String>,
    tag: Option<String>,
) -> Result<()> {
    let stack_id = resolve_stack_id(client, stack).await?;
    let mut failed = 0;

    for service in services {
        let req = CreatePipelineRun {
            stack_id,
            service: service.clone(),
            tag: tag.clone(),
        };

        match client.launch_pipeline_run(req).await {
            Ok(run) => {
                println!(
                    "{} {} {}",
                    "✓".green().bold(),
                    service.bold(),
                    format!("run {} (tag {})", run.id, run.tag).dimmed()
                );
            }
            Err(err) if err.is_conflict() => {
                failed += 1;
                println!("{} {} {}", "⚠".yellow(), service.bold(), err.to_string().yellow());
            }
            Err(err) => {
                failed += 1;
                println!("{} {} {}", "✗".red(), service.bold(), err.to_string().red());
            }
        }
    }

    if failed > 0 {
        bail!("{} pipeline run(s) could not be launched", failed);
    }

    Ok(())
}

async fn get_pipeline_run(client: &OrchestratorClient, input: &str) -> Result<()> {
    let id = resolve_pipeline_run_id(client, input).await?;
    let run = client.get_pipeline_run(id).await?;

    print_run_details(&run);

    Ok(())
}

async fn list_pipeline_runs(client: &OrchestratorClient, stack: &str) -> Result<()> {
    let stack_id = resolve_stack_id(client, stack).await?;
    let runs = client.list_pipeline_runs_by_stack(stack_id).await?;

    if runs.is_empty() {
        println!(
            "{}",
            format!("No pipeline runs found for stack {}.", stack).yellow()
        );
    } else {
        println!(
            "{}",
            format!("Found {} pipeline run(s) for stack {}:", runs.len(), stack).bold()
        );
        println!();
        for run in runs {
            print_run_summary(&run);
        }
    }

    Ok(())
}

fn print_run_summary(run: &PipelineRun) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        run.service.bold(),
        run.id.to_string().dimmed()
    );
    println!("    Status:  {}", colorize_pipeline_status(run.status));
    println!("    Tag:     {}", run.tag.dimmed());
    println!("    Created: {}", timestamp(&run.created_at).dimmed());
    println!();
}

fn print_run_details(run: &PipelineRun) {
    println!("{}", "Pipeline Run Details:".bold());
    println!("  ID:       {}", run.id.to_string().cyan());
    println!("  Stack ID: {}", run.stack_id.to_string().dimmed());
    println!("  Service:  {}", run.service.bold());
    println!("  Status:   {}", colorize_pipeline_status(run.status));
    println!("  Tag:      {}", run.tag);
    if let Some(image) = &run.image {
        println!("  Image:    {}", image);
    }
    if let Some(runner) = &run.runner_id {
        println!("  Runner:   {}", runner);
    }
    println!("  Created:  {}", timestamp(&run.created_at));
    println!("  Updated:  {}", timestamp(&run.updated_at));

    println!("\n{}", "Stages:".bold());
    for record in &run.stages {
        let output = record
            .output
            .as_deref()
            .map(|o| format!(" -> {}", o))
            .unwrap_or_default();
        println!(
            "  {} {:<7}{}",
            stage_marker(record.status),
            record.stage.to_string(),
            output.dimmed()
        );
        if let Some(error) = &record.error {
            println!("            {}", error.red());
        }
    }

    if let Some(error) = &run.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}
