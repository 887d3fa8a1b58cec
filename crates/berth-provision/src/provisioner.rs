//! The provisioning state machine.
//!
//! Steps run strictly in order and each one blocks until it finishes.
//! The first failure moves the attempt to `Failed` and stops everything;
//! nothing is retried or rolled back.

use std::path::{Path, PathBuf};

use berth_common::config::BerthConfig;
use berth_common::error::{BerthError, Result};
use berth_common::types::{PortSpec, ProvisionId, ProvisionState};
use berth_recipe::plan::requirement_files;
use berth_recipe::{CommandSpec, ProvisionPlan};

use crate::entrypoint::{self, VerifiedEntrypoint};
use crate::env::ServiceEnv;
use crate::installer::{InstallRequest, Installer, ProcessInstaller};
use crate::journal::{self, ProvisionRecord};
use crate::logs;
use crate::manifest::{self, Manifest};
use crate::root::{self, IgnoreRules};

/// A service environment ready to launch.
#[derive(Debug, Clone)]
pub struct Provisioned {
    /// Journal entry, in `DependenciesInstalled`.
    pub record: ProvisionRecord,
    /// Effective root on the host.
    pub root: PathBuf,
    /// Frozen service environment.
    pub env: ServiceEnv,
    /// Declared ports.
    pub ports: Vec<PortSpec>,
    /// Command as the recipe declares it.
    pub entrypoint: CommandSpec,
    /// What entrypoint verification found, including the command to launch.
    pub verified: VerifiedEntrypoint,
}

impl Provisioned {
    /// Attempt identifier.
    #[must_use]
    pub const fn id(&self) -> &ProvisionId {
        &self.record.id
    }
}

/// Drives a [`ProvisionPlan`] from `Unprovisioned` to `DependenciesInstalled`.
pub struct Provisioner {
    config: BerthConfig,
    installer: Box<dyn Installer>,
}

impl Provisioner {
    /// Creates a provisioner that installs with host processes.
    #[must_use]
    pub fn new(config: BerthConfig) -> Self {
        Self::with_installer(config, Box::new(ProcessInstaller))
    }

    /// Creates a provisioner with a custom installer.
    #[must_use]
    pub fn with_installer(config: BerthConfig, installer: Box<dyn Installer>) -> Self {
        Self { config, installer }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &BerthConfig {
        &self.config
    }

    /// Provisions `plan` from the build context `context`.
    ///
    /// Every transition is journaled. On failure the attempt is recorded
    /// as `Failed` before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error of the first step that failed.
    pub fn provision(&self, recipe: &Path, plan: &ProvisionPlan, context: &Path) -> Result<Provisioned> {
        let mut record = ProvisionRecord::new(ProvisionId::generate(), recipe);
        tracing::info!(id = %record.id, recipe = %recipe.display(), "provisioning started");
        self.commit(&record)?;
        self.log(&record, &format!("{} {}", record.state, recipe.display()))?;

        match self.run_steps(&mut record, plan, context) {
            Ok(provisioned) => Ok(provisioned),
            Err(err) => {
                tracing::error!(id = %record.id, state = %record.state, error = %err, "provisioning failed");
                record.advance(ProvisionState::Failed, Some(err.to_string()))?;
                self.commit(&record)?;
                self.log(&record, &format!("{}: {err}", ProvisionState::Failed))?;
                Err(err)
            }
        }
    }

    fn run_steps(
        &self,
        record: &mut ProvisionRecord,
        plan: &ProvisionPlan,
        context: &Path,
    ) -> Result<Provisioned> {
        let context = std::path::absolute(context).map_err(|e| BerthError::io(context, e))?;
        if !context.is_dir() {
            return Err(BerthError::NotFound {
                kind: "build context",
                id: context.display().to_string(),
            });
        }

        let root = root::establish_root(&self.config, &plan.workdir)?;
        record.root = Some(root.clone());
        self.transition(record, ProvisionState::RootEstablished, &root.display().to_string())?;

        let rules = IgnoreRules::load(&context)?;
        let stats = root::populate_root(&self.config, &context, &root, &plan.copies, &rules)?;
        self.log(record, &format!("populated root: {} files, {} bytes", stats.files, stats.bytes))?;

        let env = ServiceEnv::configure(plan, &root);
        self.log(
            record,
            &format!("{}={}", env.module_path_var(), env.module_path().unwrap_or_default()),
        )?;

        let manifests = self.validate_manifests(record, plan, &root)?;
        let install_env = env.for_installer();
        for command in &plan.install {
            let named: Vec<PathBuf> = requirement_files(command).iter().map(|m| root.join(m)).collect();
            let used: Vec<Manifest> = manifests
                .iter()
                .filter(|m| named.contains(&m.path))
                .cloned()
                .collect();
            self.installer.install(&InstallRequest {
                id: &record.id,
                command,
                root: &root,
                env: &install_env,
                manifests: &used,
                data_dir: &self.config.data_dir,
            })?;
        }

        record.ports.clone_from(&plan.ports);
        for port in &plan.ports {
            tracing::info!(%port, "port declared");
            self.log(record, &format!("declared port {port}"))?;
        }

        let verified = entrypoint::verify(&plan.entrypoint, &self.config, &env)?;
        self.transition(record, ProvisionState::DependenciesInstalled, &verified.command.to_string())?;

        Ok(Provisioned {
            record: record.clone(),
            root,
            env,
            ports: plan.ports.clone(),
            entrypoint: plan.entrypoint.clone(),
            verified,
        })
    }

    fn validate_manifests(
        &self,
        record: &mut ProvisionRecord,
        plan: &ProvisionPlan,
        root: &Path,
    ) -> Result<Vec<Manifest>> {
        let mut loaded = Vec::with_capacity(plan.manifests.len());
        for rel in &plan.manifests {
            let m = manifest::load(&root.join(rel))?;
            self.log(
                record,
                &format!(
                    "manifest {}: {} packages, {} constraints, {}",
                    rel.display(),
                    m.package_count(),
                    m.constraints.len(),
                    m.digest
                ),
            )?;
            record.packages += m.package_count();
            record.manifests.push(m.digest.clone());
            loaded.push(m);
        }
        Ok(loaded)
    }

    fn transition(&self, record: &mut ProvisionRecord, next: ProvisionState, detail: &str) -> Result<()> {
        record.advance(next, None)?;
        self.commit(record)?;
        self.log(record, &format!("{next} {detail}"))
    }

    fn commit(&self, record: &ProvisionRecord) -> Result<()> {
        journal::commit(&self.config.state_file(), record)
    }

    fn log(&self, record: &ProvisionRecord, line: &str) -> Result<()> {
        logs::append_log(&self.config.data_dir, &record.id, line)
    }
}
