//! Dependency installation.
//!
//! Installation is behind the [`Installer`] trait so provisioning can be
//! driven by the real package manager or by a test double.

use std::path::Path;
use std::process::Command;

use berth_common::error::{BerthError, Result};
use berth_common::types::ProvisionId;
use berth_recipe::CommandSpec;

use crate::logs;
use crate::manifest::Manifest;

/// Everything an installer needs to run one install command.
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    /// Attempt the command belongs to.
    pub id: &'a ProvisionId,
    /// Install command from the recipe.
    pub command: &'a CommandSpec,
    /// Working directory (the root).
    pub root: &'a Path,
    /// Environment layered over the host environment.
    pub env: &'a [(String, String)],
    /// Manifests the command installs from, already validated.
    pub manifests: &'a [Manifest],
    /// Directory holding the attempt log.
    pub data_dir: &'a Path,
}

/// Installs the packages one recipe command asks for.
pub trait Installer: Send + Sync {
    /// Runs the install; all-or-nothing from the provisioner's view.
    ///
    /// # Errors
    ///
    /// Returns an error if any package cannot be installed.
    fn install(&self, request: &InstallRequest<'_>) -> Result<()>;
}

/// Runs install commands as host processes.
///
/// Output is captured into the attempt log; a non-zero exit fails the step.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessInstaller;

impl Installer for ProcessInstaller {
    fn install(&self, request: &InstallRequest<'_>) -> Result<()> {
        let argv = request.command.argv();
        let Some((program, args)) = argv.split_first() else {
            return Err(BerthError::Config {
                message: "install command is empty".into(),
            });
        };
        tracing::info!(command = %request.command, root = %request.root.display(), "running installer");
        for manifest in request.manifests {
            logs::append_log(
                request.data_dir,
                request.id,
                &format!(
                    "installing {} packages from {} ({})",
                    manifest.package_count(),
                    manifest.path.display(),
                    manifest.digest
                ),
            )?;
        }
        logs::append_log(request.data_dir, request.id, &format!("$ {}", request.command))?;

        let output = Command::new(program)
            .args(args)
            .current_dir(request.root)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|e| BerthError::io(program, e))?;

        logs::append_output(request.data_dir, request.id, "stdout", &output.stdout)?;
        logs::append_output(request.data_dir, request.id, "stderr", &output.stderr)?;

        if output.status.success() {
            Ok(())
        } else {
            tracing::error!(command = %request.command, status = %output.status, "installer failed");
            Err(BerthError::StepFailed {
                step: "install dependencies",
                command: request.command.to_string(),
                status: output.status.to_string(),
            })
        }
    }
}
