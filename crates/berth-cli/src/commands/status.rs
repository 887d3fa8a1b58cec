//! `berth status`: list provisioning attempts.

use std::path::PathBuf;
use std::process::ExitCode;

use berth_common::constants::DEFAULT_RECIPE_FILE;
use berth_runtime::engine::Engine;
use clap::Args;

use super::GlobalOpts;
use crate::output;

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Recipe whose journal to read.
    #[arg(default_value = DEFAULT_RECIPE_FILE)]
    pub file: PathBuf,

    /// Print records as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `status` command.
///
/// # Errors
///
/// Returns an error if the journal exists but cannot be read.
pub fn execute(args: &StatusArgs, opts: &GlobalOpts) -> anyhow::Result<ExitCode> {
    let journal = Engine::new(opts.config(&args.file)).status()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(journal.records())?);
    } else if journal.records().is_empty() {
        println!("No provisioning attempts found.");
    } else {
        print!("{}", output::status_table(journal.records()));
    }
    Ok(ExitCode::SUCCESS)
}
