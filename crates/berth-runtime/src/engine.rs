//! Runtime engine that orchestrates build and run.

use std::path::{Path, PathBuf};

use berth_common::config::BerthConfig;
use berth_common::error::{BerthError, Result};
use berth_common::types::ProvisionState;
use berth_provision::journal::{self, Journal, ProvisionRecord};
use berth_provision::{Provisioned, Provisioner, logs};
use berth_recipe::{ProvisionPlan, parse_recipe};

use crate::launch::{LaunchRequest, Launcher, ProcessLauncher};
use crate::service::Service;

/// Reads, parses, validates, and lowers a recipe file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the recipe is invalid.
pub fn load_plan(recipe: &Path) -> Result<ProvisionPlan> {
    let content = std::fs::read_to_string(recipe).map_err(|e| BerthError::io(recipe, e))?;
    let parsed = parse_recipe(&content)?;
    ProvisionPlan::from_recipe(&parsed)
}

/// A launched service whose lifecycle is being journaled.
pub struct RunningService {
    record: ProvisionRecord,
    service: Box<dyn Service>,
    state_file: PathBuf,
    data_dir: PathBuf,
}

impl RunningService {
    /// PID of the service process.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.service.pid()
    }

    /// Journal entry as of the last transition.
    #[must_use]
    pub const fn record(&self) -> &ProvisionRecord {
        &self.record
    }

    /// Returns the exit code once the service has exited, recording it.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be queried or the journal
    /// cannot be written.
    pub fn try_wait(&mut self) -> Result<Option<i32>> {
        match self.service.try_wait()? {
            Some(code) => self.exited(code).map(Some),
            None => Ok(None),
        }
    }

    /// Blocks until the service exits and records the exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting or journaling fails.
    pub fn wait(&mut self) -> Result<i32> {
        let code = self.service.wait()?;
        self.exited(code)
    }

    /// Stops the service and records the exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be stopped or journaled.
    pub fn stop(&mut self) -> Result<i32> {
        tracing::info!(id = %self.record.id, pid = self.pid(), "stopping service");
        let code = self.service.stop()?;
        self.exited(code)
    }

    fn exited(&mut self, code: i32) -> Result<i32> {
        if self.record.state == ProvisionState::Running {
            tracing::info!(id = %self.record.id, code, "service exited");
            self.record.exit_code = Some(code);
            self.record.pid = None;
            self.record
                .advance(ProvisionState::Exited, Some(format!("exit code {code}")))?;
            journal::commit(&self.state_file, &self.record)?;
            logs::append_log(
                &self.data_dir,
                &self.record.id,
                &format!("{} code {code}", ProvisionState::Exited),
            )?;
        }
        Ok(code)
    }
}

/// The engine that coordinates provisioning and launch.
pub struct Engine {
    provisioner: Provisioner,
    launcher: Box<dyn Launcher>,
}

impl Engine {
    /// Creates an engine that installs and launches real processes.
    #[must_use]
    pub fn new(config: BerthConfig) -> Self {
        Self::with_parts(Provisioner::new(config), Box::new(ProcessLauncher))
    }

    /// Creates an engine from explicit parts.
    #[must_use]
    pub fn with_parts(provisioner: Provisioner, launcher: Box<dyn Launcher>) -> Self {
        Self {
            provisioner,
            launcher,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &BerthConfig {
        self.provisioner.config()
    }

    /// Provisions up to `DependenciesInstalled`.
    ///
    /// # Errors
    ///
    /// Returns an error if the recipe is invalid or any step fails.
    pub fn build(&self, recipe: &Path, context: &Path) -> Result<Provisioned> {
        let plan = load_plan(recipe)?;
        tracing::info!(
            recipe = %recipe.display(),
            context = %context.display(),
            data_dir = %self.config().data_dir.display(),
            "building"
        );
        self.provisioner.provision(recipe, &plan, context)
    }

    /// Provisions and launches the service.
    ///
    /// # Errors
    ///
    /// Returns an error if provisioning or launch fails. A failed launch
    /// is journaled as `Failed`.
    pub fn run(&self, recipe: &Path, context: &Path) -> Result<RunningService> {
        let provisioned = self.build(recipe, context)?;
        self.launch(provisioned)
    }

    /// Launches an already provisioned service.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    pub fn launch(&self, provisioned: Provisioned) -> Result<RunningService> {
        let state_file = self.config().state_file();
        let data_dir = self.config().data_dir.clone();
        let mut record = provisioned.record;

        let launched = self.launcher.launch(&LaunchRequest {
            command: &provisioned.verified.command,
            root: &provisioned.root,
            env: provisioned.env.vars(),
        });
        let service = match launched {
            Ok(service) => service,
            Err(err) => {
                record.advance(ProvisionState::Failed, Some(err.to_string()))?;
                journal::commit(&state_file, &record)?;
                logs::append_log(&data_dir, &record.id, &format!("{}: {err}", ProvisionState::Failed))?;
                return Err(err);
            }
        };

        record.pid = Some(service.pid());
        record.advance(ProvisionState::Running, Some(format!("pid {}", service.pid())))?;
        journal::commit(&state_file, &record)?;
        logs::append_log(
            &data_dir,
            &record.id,
            &format!("{} pid {}", ProvisionState::Running, service.pid()),
        )?;

        Ok(RunningService {
            record,
            service,
            state_file,
            data_dir,
        })
    }

    /// Loads the journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal exists but cannot be read.
    pub fn status(&self) -> Result<Journal> {
        Journal::open(&self.config().state_file())
    }

    /// Returns the record matching `id_prefix` and its provisioning log.
    ///
    /// # Errors
    ///
    /// Returns an error if no single record matches or the log is unreadable.
    pub fn logs(&self, id_prefix: &str) -> Result<(ProvisionRecord, String)> {
        let journal = self.status()?;
        let record = journal.find(id_prefix)?.clone();
        let text = logs::read_logs(&self.config().data_dir, &record.id)?;
        Ok((record, text))
    }
}
