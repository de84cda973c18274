//! Shared terminal output helpers

use chrono::{DateTime, Utc};
use colored::*;
use ferry_core::domain::deployment::DeploymentStatus;
use ferry_core::domain::operation::{Operation, OperationAction, OperationStatus};
use ferry_core::domain::pipeline::{PipelineStatus, StageStatus};
use ferry_core::domain::run_log::{RunLog, RunLogEntry};

/// Print an ordered operation list, one numbered line per operation
pub fn print_operations(operations: &[Operation]) {
    if operations.is_empty() {
        println!("{}", "No operations: nothing to do.".green());
        return;
    }

    let width = operations.len().to_string().len();
    for (idx, op) in operations.iter().enumerate() {
        println!(
            "  {:>width$}. {} {}",
            idx + 1,
            colorize_action(op.action),
            op.resource.to_string().bold(),
        );
        if !op.depends_on.is_empty() {
            println!(
                "  {:>width$}  {} {}",
                "",
                "after".dimmed(),
                op.depends_on.join(", ").dimmed()
            );
        }
    }
}

/// Print the latest state of every operation plus a failure report
pub fn print_run_log(log: &RunLog) {
    for entry in &log.entries {
        print_run_log_entry(entry);
    }

    let failures = log.failures();
    if !failures.is_empty() {
        println!("\n{}", "Failures:".bold());
        for failure in failures {
            println!("  {} {}", "✗".red(), failure.to_string().red());
        }
    }
}

fn print_run_log_entry(entry: &RunLogEntry) {
    let attempts = if entry.attempts > 1 {
        format!(" ({} attempts)", entry.attempts)
    } else {
        String::new()
    };

    println!(
        "{} {:<10} {}{}",
        time_of_day(&entry.timestamp).dimmed(),
        colorize_operation_status(entry.status),
        entry.operation_id,
        attempts.dimmed()
    );

    if let Some(error) = &entry.error {
        println!("           {}", format!("{}: {}", error.kind, error.message).red());
    }
    if let Some(by) = &entry.halted_by {
        println!("           {}", format!("halted by {}", by).yellow());
    }
}

pub fn colorize_action(action: OperationAction) -> ColoredString {
    let label = format!("{:<6}", action.as_str());
    match action {
        OperationAction::Create => label.green(),
        OperationAction::Update => label.yellow(),
        OperationAction::Delete => label.red(),
    }
}

pub fn colorize_operation_status(status: OperationStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        OperationStatus::Pending => label.dimmed(),
        OperationStatus::Running => label.cyan(),
        OperationStatus::Succeeded => label.green(),
        OperationStatus::Failed => label.red(),
        OperationStatus::Halted => label.yellow(),
    }
}

pub fn colorize_deployment_status(status: DeploymentStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        DeploymentStatus::Queued => label.yellow(),
        DeploymentStatus::Running => label.cyan(),
        DeploymentStatus::Succeeded => label.green(),
        DeploymentStatus::Failed => label.red(),
        DeploymentStatus::Cancelled => label.dimmed(),
    }
}

pub fn colorize_pipeline_status(status: PipelineStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        PipelineStatus::Pending => label.yellow(),
        PipelineStatus::Building | PipelineStatus::Pushing | PipelineStatus::Deploying => {
            label.cyan()
        }
        PipelineStatus::Succeeded => label.green(),
        PipelineStatus::Failed => label.red(),
    }
}

pub fn stage_marker(status: StageStatus) -> ColoredString {
    match status {
        StageStatus::NotRun => "·".dimmed(),
        StageStatus::Running => "▸".cyan(),
        StageStatus::Succeeded => "✓".green(),
        StageStatus::Failed => "✗".red(),
    }
}

/// `YYYY-MM-DD HH:MM:SS`
pub fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `HH:MM:SS`
pub fn time_of_day(at: &DateTime<Utc>) -> String {
    at.format("%H:%M:%S").to_string()
}

/// Whole seconds between two instants, when both are known
pub fn duration_secs(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<i64> {
    Some(end?.signed_duration_since(start?).num_seconds())
}
