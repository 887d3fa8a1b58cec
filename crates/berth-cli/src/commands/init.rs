//! `berth init`: write the default recipe.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use berth_common::constants::{DEFAULT_RECIPE, DEFAULT_RECIPE_FILE};
use clap::Args;

/// Arguments for the `init` command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the recipe.
    #[arg(default_value = DEFAULT_RECIPE_FILE)]
    pub file: PathBuf,

    /// Overwrite an existing recipe.
    #[arg(short, long)]
    pub force: bool,
}

/// Executes the `init` command.
///
/// # Errors
///
/// Returns an error if the recipe exists and `--force` was not given, or
/// the file cannot be written.
pub fn execute(args: &InitArgs) -> anyhow::Result<ExitCode> {
    write_recipe(&args.file, args.force)?;
    println!("Wrote {}", args.file.display());
    Ok(ExitCode::SUCCESS)
}

fn write_recipe(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, DEFAULT_RECIPE)
        .with_context(|| format!("failed to write {}", path.display()))
}
