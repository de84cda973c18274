//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deploy;
mod pipeline;
mod plan;
mod stack;

pub use deploy::DeployCommands;
pub use pipeline::PipelineCommands;
pub use stack::StackCommands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Plan a manifest offline and print the ordered operations
    Plan {
        /// Desired-state manifest (YAML or JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Print the operations as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stack (desired state) management
    Stack {
        #[command(subcommand)]
        command: StackCommands,
    },
    /// Apply and reconcile stacks
    Deploy {
        #[command(subcommand)]
        command: DeployCommands,
    },
    /// Per-service build, push and deploy runs
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
}

/// Route a command to its handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Plan { file, json } => plan::plan_manifest(&file, json),
        Commands::Stack { command } => stack::handle_stack_command(command, config).await,
        Commands::Deploy { command } => deploy::handle_deploy_command(command, config).await,
        Commands::Pipeline { command } => {
            pipeline::handle_pipeline_command(command, config).await
        }
    }
}
