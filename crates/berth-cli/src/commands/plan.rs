//! `berth plan`: show the provisioning steps before running them.

use std::path::PathBuf;
use std::process::ExitCode;

use berth_common::constants::DEFAULT_RECIPE_FILE;
use berth_runtime::engine::load_plan;
use clap::Args;

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the recipe.
    #[arg(default_value = DEFAULT_RECIPE_FILE)]
    pub file: PathBuf,

    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `plan` command.
///
/// Parses and validates the recipe, lowers it, and prints the ordered
/// steps. Nothing is provisioned.
///
/// # Errors
///
/// Returns an error if the recipe cannot be read or is invalid.
pub fn execute(args: &PlanArgs) -> anyhow::Result<ExitCode> {
    let plan = load_plan(&args.file)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Provisioning plan for: {}", args.file.display());
    println!("  base image: {}", plan.base);
    println!();
    print!("{}", output::render_plan(&plan));
    Ok(ExitCode::SUCCESS)
}
