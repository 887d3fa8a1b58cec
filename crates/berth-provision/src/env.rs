//! Service environment configuration.
//!
//! The environment is computed once, after the root exists, and is never
//! mutated afterwards. It is handed to installers and to the launched
//! process; Berth never changes its own process environment.

use std::path::{Path, PathBuf};

use berth_common::constants::NO_CACHE_VAR;
use berth_recipe::ProvisionPlan;

/// The frozen environment of a provisioned service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEnv {
    vars: Vec<(String, String)>,
    module_path_var: String,
    root: PathBuf,
}

impl ServiceEnv {
    /// Builds the environment for `plan` with the root at `root`.
    ///
    /// Values equal to the declared WORKDIR are rewritten to the effective
    /// root, so the module-resolution variable names the real directory.
    #[must_use]
    pub fn configure(plan: &ProvisionPlan, root: &Path) -> Self {
        let declared = plan.workdir.to_string_lossy();
        let effective = root.to_string_lossy().into_owned();
        let vars = plan
            .env
            .iter()
            .map(|(k, v)| {
                let value = if *v == declared { effective.clone() } else { v.clone() };
                (k.clone(), value)
            })
            .collect();
        tracing::info!(
            var = %plan.module_path_var,
            value = %effective,
            "module resolution configured"
        );
        Self {
            vars,
            module_path_var: plan.module_path_var.clone(),
            root: root.to_path_buf(),
        }
    }

    /// All variables in declaration order.
    #[must_use]
    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    /// Looks up one variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Name of the module-resolution variable.
    #[must_use]
    pub fn module_path_var(&self) -> &str {
        &self.module_path_var
    }

    /// Value of the module-resolution variable (always the root).
    #[must_use]
    pub fn module_path(&self) -> Option<&str> {
        self.get(&self.module_path_var)
    }

    /// The root this environment was configured for.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Environment for installer commands: service vars plus the no-cache switch.
    #[must_use]
    pub fn for_installer(&self) -> Vec<(String, String)> {
        let mut vars = self.vars.clone();
        if !vars.iter().any(|(k, _)| k == NO_CACHE_VAR) {
            vars.push((NO_CACHE_VAR.to_string(), "1".to_string()));
        }
        vars
    }
}
