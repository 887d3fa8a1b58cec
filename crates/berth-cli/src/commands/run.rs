//! `berth run`: provision and run the service in the foreground.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use berth_common::constants::DEFAULT_RECIPE_FILE;
use berth_runtime::engine::{Engine, RunningService};
use clap::Args;

use super::{GlobalOpts, context_for, exit_status};
use crate::output;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the recipe.
    #[arg(default_value = DEFAULT_RECIPE_FILE)]
    pub file: PathBuf,

    /// Build context directory [default: the recipe's directory].
    #[arg(long)]
    pub context: Option<PathBuf>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Executes the `run` command.
///
/// The service shares this terminal. Ctrl+C stops it; the process exits
/// with the service's exit code.
///
/// # Errors
///
/// Returns an error if provisioning or launch fails.
pub fn execute(args: &RunArgs, opts: &GlobalOpts) -> anyhow::Result<ExitCode> {
    let engine = Engine::new(opts.config(&args.file));
    let context = context_for(&args.file, args.context.as_deref());

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let provisioned = engine.build(&args.file, &context)?;
    super::build::print_summary(&provisioned);
    let mut service = engine.launch(provisioned)?;
    eprintln!(
        "Service {} running (pid {}). Press Ctrl+C to stop.",
        output::short_id(service.record().id.as_str()),
        service.pid()
    );

    let code = supervise(&mut service, &running)?;
    eprintln!("Service exited with code {code}");
    Ok(ExitCode::from(exit_status(code)))
}

fn supervise(service: &mut RunningService, running: &AtomicBool) -> anyhow::Result<i32> {
    loop {
        if let Some(code) = service.try_wait()? {
            return Ok(code);
        }
        if !running.load(Ordering::SeqCst) {
            eprintln!("Stopping service...");
            return Ok(service.stop()?);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
