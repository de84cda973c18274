//! Stack command handlers
//!
//! Registering, inspecting and editing desired states on the orchestrator.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use ferry_client::OrchestratorClient;
use ferry_core::domain::stack::Stack;
use ferry_core::dto::stack::{CreateStack, StackSummary, UpdateStack};

use crate::config::Config;
use crate::display::{print_operations, timestamp};
use crate::id_resolver::resolve_stack_id;
use crate::manifest;

/// Stack subcommands
#[derive(Subcommand)]
pub enum StackCommands {
    /// Register a desired state from a manifest
    Create {
        /// Desired-state manifest (YAML or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Let the orchestrator reconcile this stack periodically
        #[arg(long)]
        auto_reconcile: bool,
    },
    /// List all stacks
    List,
    /// Show a stack and its declared resources
    Get {
        /// Stack name, ID or unambiguous ID prefix
        stack: String,
    },
    /// Replace the desired state of a stack
    Update {
        /// Stack name, ID or unambiguous ID prefix
        stack: String,

        /// Desired-state manifest (YAML or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Turn periodic reconciliation on or off
        #[arg(long)]
        auto_reconcile: Option<bool>,
    },
    /// Delete a stack with its deployments and pipeline runs
    Delete {
        /// Stack name, ID or unambiguous ID prefix
        stack: String,
    },
    /// Show the operations that bring an empty environment to the stack
    Plan {
        /// Stack name, ID or unambiguous ID prefix
        stack: String,
    },
}

/// Handle stack commands
pub async fn handle_stack_command(command: StackCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        StackCommands::Create {
            file,
            auto_reconcile,
        } => create_stack(&client, file, auto_reconcile).await,
        StackCommands::List => list_stacks(&client).await,
        StackCommands::Get { stack } => get_stack(&client, &stack).await,
        StackCommands::Update {
            stack,
            file,
            auto_reconcile,
        } => update_stack(&client, &stack, file, auto_reconcile).await,
        StackCommands::Delete { stack } => delete_stack(&client, &stack).await,
        StackCommands::Plan { stack } => plan_stack(&client, &stack).await,
    }
}

async fn create_stack(
    client: &OrchestratorClient,
    file: PathBuf,
    auto_reconcile: bool,
) -> Result<()> {
    let desired = manifest::load(&file)?;

    let stack = client
        .create_stack(CreateStack {
            desired,
            auto_reconcile,
        })
        .await?;

    println!("{}", "✓ Stack created successfully!".green().bold());
    println!("  ID:        {}", stack.id.to_string().cyan());
    println!("  Name:      {}", stack.name.bold());
    println!(
        "  Resources: {}",
        stack.desired.resources.len().to_string().dimmed()
    );
    if stack.auto_reconcile {
        println!("  Reconcile: {}", "periodic".dimmed());
    }

    Ok(())
}

async fn list_stacks(client: &OrchestratorClient) -> Result<()> {
    let stacks = client.list_stacks().await?;

    if stacks.is_empty() {
        println!("{}", "No stacks found.".yellow());
    } else {
        println!("{}", format!("Found {} stack(s):", stacks.len()).bold());
        println!();
        for stack in stacks {
            print_stack_summary(&stack);
        }
    }

    Ok(())
}

async fn get_stack(client: &OrchestratorClient, input: &str) -> Result<()> {
    let id = resolve_stack_id(client, input).await?;
    let stack = client.get_stack(id).await?;

    print_stack_details(&stack);

    Ok(())
}

async fn update_stack(
    client: &OrchestratorClient,
    input: &str,
    file: PathBuf,
    auto_reconcile: Option<bool>,
) -> Result<()> {
    let id = resolve_stack_id(client, input).await?;
    let desired = manifest::load(&file)?;

    let stack = client
        .update_stack(
            id,
            UpdateStack {
                desired,
                auto_reconcile,
            },
        )
        .await?;

    println!(
        "{}",
        format!("✓ Stack {} updated successfully!", stack.name)
            .green()
            .bold()
    );
    println!(
        "  Resources: {}",
        stack.desired.resources.len().to_string().dimmed()
    );
    println!(
        "  {}",
        "Run `ferry deploy apply` or `ferry deploy reconcile` to converge.".dimmed()
    );

    Ok(())
}

async fn delete_stack(client: &OrchestratorClient, input: &str) -> Result<()> {
    let id = resolve_stack_id(client, input).await?;

    client.delete_stack(id).await?;

    println!(
        "{}",
        format!("✓ Stack {} deleted successfully!", id).green().bold()
    );

    Ok(())
}

async fn plan_stack(client: &OrchestratorClient, input: &str) -> Result<()> {
    let id = resolve_stack_id(client, input).await?;
    let operations = client.plan_stack(id).await?;

    println!(
        "{}",
        format!("Plan for stack {} ({} operation(s)):", id, operations.len()).bold()
    );
    print_operations(&operations);

    Ok(())
}

fn print_stack_summary(stack: &StackSummary) {
    println!("  {} {}", "▸".cyan(), stack.name.bold());
    println!("    ID:        {}", stack.id.to_string().dimmed());
    println!(
        "    Resources: {} ({} service(s))",
        stack.resource_count.to_string().dimmed(),
        stack.service_count.to_string().dimmed()
    );
    if stack.auto_reconcile {
        println!("    Reconcile: {}", "periodic".dimmed());
    }
    println!("    Updated:   {}", timestamp(&stack.updated_at).dimmed());
    println!();
}

fn print_stack_details(stack: &Stack) {
    println!("{}", "Stack Details:".bold());
    println!("  ID:        {}", stack.id.to_string().cyan());
    println!("  Name:      {}", stack.name.bold());
    println!(
        "  Reconcile: {}",
        if stack.auto_reconcile {
            "periodic"
        } else {
            "on demand"
        }
    );
    println!("  Created:   {}", timestamp(&stack.created_at));
    println!("  Updated:   {}", timestamp(&stack.updated_at));

    println!("\n{}", "Resources:".bold());
    for decl in &stack.desired.resources {
        let service = if decl.build.is_some() { " (service)" } else { "" };
        println!("  {}{}", decl.reference().to_string().cyan(), service.dimmed());
        if !decl.depends_on.is_empty() {
            println!("      depends on: {}", decl.depends_on.join(", ").dimmed());
        }
        for (key, value) in &decl.properties {
            println!("      {} = {}", key, value.to_string().dimmed());
        }
    }
}
