//! `berth build`: provision the environment without launching.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use berth_common::constants::DEFAULT_RECIPE_FILE;
use berth_provision::Provisioned;
use berth_runtime::engine::Engine;
use clap::Args;

use super::{GlobalOpts, context_for};
use crate::output;

/// Arguments for the `build` command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Path to the recipe.
    #[arg(default_value = DEFAULT_RECIPE_FILE)]
    pub file: PathBuf,

    /// Build context directory [default: the recipe's directory].
    #[arg(long)]
    pub context: Option<PathBuf>,
}

/// Executes the `build` command.
///
/// # Errors
///
/// Returns an error if any provisioning step fails; the attempt is left
/// in the journal as `FAILED`.
pub fn execute(args: &BuildArgs, opts: &GlobalOpts) -> anyhow::Result<ExitCode> {
    let start = Instant::now();
    let engine = Engine::new(opts.config(&args.file));
    let context = context_for(&args.file, args.context.as_deref());
    let provisioned = engine.build(&args.file, &context)?;
    print_summary(&provisioned);
    println!("  built in {:.1}s", start.elapsed().as_secs_f64());
    Ok(ExitCode::SUCCESS)
}

/// Prints what provisioning produced.
pub fn print_summary(p: &Provisioned) {
    println!("Provisioned {} ({})", output::short_id(p.id().as_str()), p.record.state);
    println!("  root:        {}", p.root.display());
    println!(
        "  environment: {}={}",
        p.env.module_path_var(),
        p.env.module_path().unwrap_or_default()
    );
    println!("  packages:    {}", p.record.packages);
    println!("  ports:       {}", output::format_ports(&p.ports));
    println!("  entrypoint:  {}", p.verified.command);
}
