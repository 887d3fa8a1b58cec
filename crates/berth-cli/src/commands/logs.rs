//! `berth logs`: view the provisioning log of an attempt.

use std::path::PathBuf;
use std::process::ExitCode;

use berth_common::constants::DEFAULT_RECIPE_FILE;
use berth_runtime::engine::Engine;
use clap::Args;

use super::GlobalOpts;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Attempt ID or unique prefix.
    pub id: String,

    /// Recipe whose journal to read.
    #[arg(long, default_value = DEFAULT_RECIPE_FILE)]
    pub file: PathBuf,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if no single attempt matches or its log is unreadable.
pub fn execute(args: &LogsArgs, opts: &GlobalOpts) -> anyhow::Result<ExitCode> {
    let engine = Engine::new(opts.config(&args.file));
    let (record, text) = engine.logs(&args.id)?;

    if text.is_empty() {
        println!("No logs available for attempt: {}", record.id);
    } else {
        print!("{text}");
    }
    Ok(ExitCode::SUCCESS)
}
