//! Entrypoint verification.
//!
//! Run after installation so that programs installed by the recipe
//! (a virtualenv's `bin/`, for instance) can be found.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use berth_common::config::BerthConfig;
use berth_common::error::{BerthError, Result};
use berth_recipe::CommandSpec;

use crate::env::ServiceEnv;

/// What verification found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEntrypoint {
    /// Command to launch: the resolved program and host-mapped paths for
    /// exec form, the declared text for shell form.
    pub command: CommandSpec,
    /// Resolved program, when the command was in exec form.
    pub program: Option<PathBuf>,
    /// Entrypoint file inside the root, if the command names one.
    pub script: Option<PathBuf>,
}

/// Checks that the service command can actually start.
///
/// For exec-form commands the program must resolve: bare names through
/// `PATH` (the service environment's, falling back to the host's) and
/// paths relative to the root. The first non-flag argument is the
/// entrypoint file and must exist in the root. Arguments after `-m` or
/// `-c` name modules or code, not files, and are not checked.
///
/// Absolute paths are read through [`BerthConfig::host_path`], so
/// `/app/api/app.py` lands in the effective root under a sysroot.
///
/// # Errors
///
/// Returns [`BerthError::NotFound`] if the program or entrypoint file is
/// missing.
pub fn verify(command: &CommandSpec, config: &BerthConfig, env: &ServiceEnv) -> Result<VerifiedEntrypoint> {
    let CommandSpec::Exec(argv) = command else {
        tracing::debug!(%command, "shell-form entrypoint, skipping verification");
        return Ok(VerifiedEntrypoint {
            command: command.clone(),
            program: None,
            script: None,
        });
    };
    let Some((program, args)) = argv.split_first() else {
        return Err(BerthError::Config {
            message: "entrypoint command is empty".into(),
        });
    };

    let root = env.root();
    let program = resolve_program(program, config, root, env.vars())?;
    let mut launch = vec![program.to_string_lossy().into_owned()];
    launch.extend(args.iter().cloned());

    let script = match entry_file(args) {
        Some((index, file)) => {
            let path = in_root(file, config, root);
            if !path.is_file() {
                return Err(BerthError::NotFound {
                    kind: "entrypoint file",
                    id: path.display().to_string(),
                });
            }
            if Path::new(file).is_absolute() {
                launch[index + 1] = path.to_string_lossy().into_owned();
            }
            Some(path)
        }
        None => None,
    };
    tracing::info!(program = %program.display(), script = ?script, "entrypoint verified");
    Ok(VerifiedEntrypoint {
        command: CommandSpec::Exec(launch),
        program: Some(program),
        script,
    })
}

/// Host location of a path named by the recipe.
fn in_root(declared: &str, config: &BerthConfig, root: &Path) -> PathBuf {
    let path = Path::new(declared);
    if path.is_absolute() {
        config.host_path(path)
    } else {
        root.join(path)
    }
}

fn resolve_program(program: &str, config: &BerthConfig, root: &Path, env: &[(String, String)]) -> Result<PathBuf> {
    if program.contains('/') {
        let path = in_root(program, config, root);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(BerthError::NotFound {
                kind: "entrypoint program",
                id: path.display().to_string(),
            })
        };
    }
    let search: Option<OsString> = env
        .iter()
        .find(|(k, _)| k == "PATH")
        .map(|(_, v)| OsString::from(v))
        .or_else(|| std::env::var_os("PATH"));
    which::which_in(program, search, root).map_err(|_| BerthError::NotFound {
        kind: "entrypoint program",
        id: program.to_string(),
    })
}

/// Index and text of the first non-flag argument.
fn entry_file(args: &[String]) -> Option<(usize, &str)> {
    for (index, arg) in args.iter().enumerate() {
        match arg.as_str() {
            "-m" | "-c" => return None,
            flag if flag.starts_with('-') => {}
            file => return Some((index, file)),
        }
    }
    None
}
