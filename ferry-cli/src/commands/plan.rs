//! Offline planning

use std::path::Path;

use anyhow::{Context, Result};
use colored::*;
use ferry_core::planner;

use crate::display::print_operations;
use crate::manifest;

/// Plan a manifest without contacting the orchestrator
pub fn plan_manifest(path: &Path, json: bool) -> Result<()> {
    let desired = manifest::load(path)?;
    let operations = planner::plan(&desired)
        .with_context(|| format!("Cannot plan desired state '{}'", desired.name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&operations)?);
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "Plan for {} ({} operation(s)):",
            desired.name,
            operations.len()
        )
        .bold()
    );
    print_operations(&operations);

    Ok(())
}
