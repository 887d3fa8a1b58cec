//! Lowering of a validated recipe into a provisioning plan.
//!
//! The plan is the typed, ordered description the provisioner executes:
//! root, copies, environment, install commands, manifests, ports, entrypoint.

use std::path::PathBuf;

use berth_common::constants::MODULE_PATH_VAR;
use berth_common::error::{BerthError, Result};
use berth_common::types::PortSpec;
use serde::{Deserialize, Serialize};

use crate::parser::ast::{CommandSpec, Instruction, Recipe};

/// One `COPY` from the build context into the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySpec {
    /// Sources relative to the build context.
    pub sources: Vec<String>,
    /// Destination, relative to the root unless absolute.
    pub dest: String,
}

/// The ordered provisioning plan derived from a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionPlan {
    /// Base runtime image, recorded for reference.
    pub base: String,
    /// Declared working directory (absolute).
    pub workdir: PathBuf,
    /// Copies that populate the root.
    pub copies: Vec<CopySpec>,
    /// Environment in first-assignment order; later assignments overwrite values.
    pub env: Vec<(String, String)>,
    /// Name of the variable whose value is the root.
    pub module_path_var: String,
    /// Dependency installation commands, in order.
    pub install: Vec<CommandSpec>,
    /// Manifests referenced by the install commands, relative to the root.
    pub manifests: Vec<PathBuf>,
    /// Declared ports.
    pub ports: Vec<PortSpec>,
    /// The service process.
    pub entrypoint: CommandSpec,
}

impl ProvisionPlan {
    /// Lowers a validated recipe.
    ///
    /// # Errors
    ///
    /// Returns an error if the recipe declares no `WORKDIR` or no `CMD`, or
    /// sets `PYTHONPATH` to something other than the `WORKDIR` while no other
    /// variable names it.
    pub fn from_recipe(recipe: &Recipe) -> Result<Self> {
        let mut base = String::new();
        let mut workdir = None;
        let mut copies = Vec::new();
        let mut env: Vec<(String, String)> = Vec::new();
        let mut install = Vec::new();
        let mut ports = Vec::new();
        let mut entrypoint = None;

        for ins in recipe.iter() {
            match ins {
                Instruction::From { image, .. } => base.clone_from(image),
                Instruction::Workdir(path) => workdir = Some(PathBuf::from(path)),
                Instruction::Env(pairs) => {
                    for (key, value) in pairs {
                        set_env(&mut env, key, value);
                    }
                }
                Instruction::Copy { sources, dest } => copies.push(CopySpec {
                    sources: sources.clone(),
                    dest: dest.clone(),
                }),
                Instruction::Run(cmd) => install.push(cmd.clone()),
                Instruction::Expose(declared) => {
                    for port in declared {
                        if !ports.contains(port) {
                            ports.push(*port);
                        }
                    }
                }
                Instruction::Cmd(cmd) => entrypoint = Some(cmd.clone()),
            }
        }

        let workdir = workdir.ok_or_else(|| BerthError::Parse {
            line: 0,
            message: "recipe declares no WORKDIR".into(),
        })?;
        let entrypoint = entrypoint.ok_or_else(|| BerthError::Parse {
            line: 0,
            message: "recipe declares no CMD".into(),
        })?;

        let root = workdir.to_string_lossy().into_owned();
        let module_path_var = if let Some((key, _)) = env.iter().find(|(_, v)| *v == root) {
            key.clone()
        } else if let Some(value) = env.iter().find(|(k, _)| k == MODULE_PATH_VAR).map(|(_, v)| v) {
            let line = recipe
                .instructions
                .iter()
                .rev()
                .find(|l| match &l.instruction {
                    Instruction::Env(pairs) => pairs.iter().any(|(k, _)| k == MODULE_PATH_VAR),
                    _ => false,
                })
                .map_or(0, |l| l.line);
            return Err(BerthError::Parse {
                line,
                message: format!(
                    "{MODULE_PATH_VAR}={value} does not include the WORKDIR {root}; set it to {root}"
                ),
            });
        } else {
            tracing::debug!(var = MODULE_PATH_VAR, "no ENV names the root, adding default");
            set_env(&mut env, MODULE_PATH_VAR, &root);
            MODULE_PATH_VAR.to_string()
        };

        let mut manifests = Vec::new();
        for cmd in &install {
            for m in requirement_files(cmd) {
                if !manifests.contains(&m) {
                    manifests.push(m);
                }
            }
        }

        tracing::info!(
            workdir = %workdir.display(),
            steps = install.len(),
            manifests = manifests.len(),
            "recipe lowered to plan"
        );

        Ok(Self {
            base,
            workdir,
            copies,
            env,
            module_path_var,
            install,
            manifests,
            ports,
            entrypoint,
        })
    }

    /// Value of an environment variable as the plan declares it.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn set_env(env: &mut Vec<(String, String)>, key: &str, value: &str) {
    if let Some(slot) = env.iter_mut().find(|(k, _)| k == key) {
        slot.1 = value.to_string();
    } else {
        env.push((key.to_string(), value.to_string()));
    }
}

/// Extracts requirement files named by `-r`/`--requirement` options.
#[must_use]
pub fn requirement_files(cmd: &CommandSpec) -> Vec<PathBuf> {
    let words = cmd.words();
    let mut files = Vec::new();
    let mut iter = words.iter();
    while let Some(w) = iter.next() {
        let file = match w.as_str() {
            "-r" | "--requirement" => iter.next().cloned(),
            other => other
                .strip_prefix("--requirement=")
                .or_else(|| other.strip_prefix("-r").filter(|s| !s.is_empty()))
                .map(String::from),
        };
        if let Some(f) = file {
            files.push(PathBuf::from(f));
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use berth_common::constants::DEFAULT_RECIPE;

    use super::*;
    use crate::parser::parse_recipe;

    fn plan(input: &str) -> ProvisionPlan {
        let recipe = parse_recipe(input).expect("should parse");
        ProvisionPlan::from_recipe(&recipe).expect("should lower")
    }

    #[test]
    fn default_recipe_lowers_to_contract() {
        let p = plan(DEFAULT_RECIPE);
        assert_eq!(p.base, "python:3.10-slim");
        assert_eq!(p.workdir, PathBuf::from("/app"));
        assert_eq!(p.module_path_var, "PYTHONPATH");
        assert_eq!(p.env_value("PYTHONPATH"), Some("/app"));
        assert_eq!(p.ports, vec![PortSpec::tcp(5000)]);
        assert_eq!(p.manifests, vec![PathBuf::from("requirements.txt")]);
        assert_eq!(p.install.len(), 1);
        assert_eq!(
            p.entrypoint,
            CommandSpec::Exec(vec!["python".into(), "api/app.py".into()])
        );
    }

    #[test]
    fn module_path_var_defaults_when_missing() {
        let p = plan("FROM b\nWORKDIR /srv\nCMD [\"run\"]");
        assert_eq!(p.module_path_var, "PYTHONPATH");
        assert_eq!(p.env_value("PYTHONPATH"), Some("/srv"));
    }

    #[test]
    fn module_path_var_uses_recipe_name() {
        let p = plan("FROM b\nWORKDIR /srv\nENV APP_HOME=/srv\nCMD [\"run\"]");
        assert_eq!(p.module_path_var, "APP_HOME");
        assert!(p.env_value("PYTHONPATH").is_none());
    }

    #[test]
    fn conflicting_module_path_is_rejected() {
        let recipe =
            parse_recipe("FROM b\nWORKDIR /app\nENV PYTHONPATH=/opt/lib\nCMD [\"run\"]").expect("parse");
        let err = ProvisionPlan::from_recipe(&recipe).unwrap_err();
        assert!(matches!(err, BerthError::Parse { line: 3, .. }), "got: {err}");
        assert!(err.to_string().contains("/opt/lib"), "got: {err}");
    }

    #[test]
    fn later_env_assignment_wins() {
        let p = plan("FROM b\nENV A=1 B=2\nENV A=3\nWORKDIR /x\nCMD [\"run\"]");
        assert_eq!(p.env_value("A"), Some("3"));
        assert_eq!(p.env[0].0, "A");
    }

    #[test]
    fn duplicate_ports_collapse() {
        let p = plan("FROM b\nEXPOSE 5000\nEXPOSE 5000/tcp\nWORKDIR /x\nCMD [\"run\"]");
        assert_eq!(p.ports, vec![PortSpec::tcp(5000)]);
    }

    #[test]
    fn missing_cmd_fails_lowering() {
        let recipe = parse_recipe("FROM b\nWORKDIR /app").expect("should parse");
        let err = ProvisionPlan::from_recipe(&recipe).unwrap_err();
        assert!(err.to_string().contains("no CMD"), "got: {err}");
    }

    #[test]
    fn missing_workdir_fails_lowering() {
        let recipe = parse_recipe("FROM b\nEXPOSE 5000").expect("should parse");
        assert!(ProvisionPlan::from_recipe(&recipe).is_err());
    }

    #[test]
    fn requirement_files_understands_option_spellings() {
        let cmd = CommandSpec::Shell(
            "pip install -r a.txt -rb.txt --requirement c.txt --requirement=d.txt -q".into(),
        );
        assert_eq!(
            requirement_files(&cmd),
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b.txt"),
                PathBuf::from("c.txt"),
                PathBuf::from("d.txt"),
            ]
        );
    }

    #[test]
    fn requirement_files_in_exec_form() {
        let cmd = CommandSpec::Exec(vec![
            "python".into(),
            "-m".into(),
            "pip".into(),
            "install".into(),
            "-r".into(),
            "deps/prod.txt".into(),
        ]);
        assert_eq!(requirement_files(&cmd), vec![PathBuf::from("deps/prod.txt")]);
    }
}
