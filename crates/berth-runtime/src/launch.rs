//! Service launch abstraction.
//!
//! The engine launches through the [`Launcher`] trait so tests can run
//! without spawning real services.

use std::path::Path;
use std::process::Command;

use berth_common::error::{BerthError, Result};
use berth_recipe::CommandSpec;

use crate::service::{ProcessService, Service};

/// What to launch and where.
#[derive(Debug, Clone, Copy)]
pub struct LaunchRequest<'a> {
    /// Service command, launched with no extra arguments.
    pub command: &'a CommandSpec,
    /// Working directory (the root).
    pub root: &'a Path,
    /// Service environment layered over the host environment.
    pub env: &'a [(String, String)],
}

/// Starts exactly one service process.
pub trait Launcher: Send + Sync {
    /// Launches the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    fn launch(&self, request: &LaunchRequest<'_>) -> Result<Box<dyn Service>>;
}

/// Spawns the service as a child process sharing this terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, request: &LaunchRequest<'_>) -> Result<Box<dyn Service>> {
        let argv = request.command.argv();
        let Some((program, args)) = argv.split_first() else {
            return Err(BerthError::Config {
                message: "service command is empty".into(),
            });
        };
        tracing::info!(command = %request.command, root = %request.root.display(), "launching service");
        let child = Command::new(program)
            .args(args)
            .current_dir(request.root)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .spawn()
            .map_err(|e| BerthError::io(program, e))?;
        tracing::info!(pid = child.id(), "service started");
        Ok(Box::new(ProcessService::new(child)))
    }
}
