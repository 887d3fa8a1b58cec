//! Static analysis and validation of the parsed AST.
//!
//! Enforces the ordering the provisioning contract depends on: the root is
//! declared before anything uses it, and the root is populated before any
//! installation command runs.

use berth_common::error::{BerthError, Result};

use super::ast::{CommandSpec, Instruction, Recipe};

/// Validates a parsed recipe for semantic correctness.
///
/// # Checks performed
///
/// 1. The first instruction is `FROM`, and it appears once.
/// 2. At most one `WORKDIR`, and it is absolute.
/// 3. `COPY`, `RUN` and `CMD` come after the `WORKDIR`.
/// 4. Every `RUN` follows at least one `COPY`.
/// 5. `ENV` keys are valid identifiers.
/// 6. At most one `CMD`, with a non-empty command.
///
/// # Errors
///
/// Returns an error if any semantic check fails.
pub fn validate(recipe: &Recipe) -> Result<()> {
    tracing::info!("validating recipe");
    check_from_first(recipe)?;
    check_ordering(recipe)?;
    check_env_keys(recipe)?;
    check_single_cmd(recipe)?;
    Ok(())
}

fn check_from_first(recipe: &Recipe) -> Result<()> {
    let Some(first) = recipe.instructions.first() else {
        return Err(BerthError::Parse {
            line: 0,
            message: "recipe is empty".into(),
        });
    };
    if !matches!(first.instruction, Instruction::From { .. }) {
        return Err(BerthError::Parse {
            line: first.line,
            message: format!(
                "recipe must start with FROM, found {}",
                first.instruction.keyword()
            ),
        });
    }
    if let Some(extra) = recipe
        .instructions
        .iter()
        .skip(1)
        .find(|l| matches!(l.instruction, Instruction::From { .. }))
    {
        return Err(BerthError::Parse {
            line: extra.line,
            message: "multi-stage recipes are not supported".into(),
        });
    }
    Ok(())
}

fn check_ordering(recipe: &Recipe) -> Result<()> {
    let mut workdir_seen = false;
    let mut copy_seen = false;

    for located in &recipe.instructions {
        match &located.instruction {
            Instruction::Workdir(path) => {
                if workdir_seen {
                    return Err(BerthError::Parse {
                        line: located.line,
                        message: "duplicate WORKDIR; the root is established once".into(),
                    });
                }
                if !path.starts_with('/') {
                    return Err(BerthError::Parse {
                        line: located.line,
                        message: format!("WORKDIR must be absolute, got \"{path}\""),
                    });
                }
                workdir_seen = true;
            }
            ins @ (Instruction::Copy { .. } | Instruction::Run(_) | Instruction::Cmd(_))
                if !workdir_seen =>
            {
                return Err(BerthError::Parse {
                    line: located.line,
                    message: format!("{} appears before WORKDIR", ins.keyword()),
                });
            }
            Instruction::Copy { .. } => copy_seen = true,
            Instruction::Run(_) if !copy_seen => {
                return Err(BerthError::Parse {
                    line: located.line,
                    message: "RUN appears before any COPY; the root must be populated first"
                        .into(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_env_keys(recipe: &Recipe) -> Result<()> {
    for located in &recipe.instructions {
        if let Instruction::Env(pairs) = &located.instruction {
            if let Some((key, _)) = pairs.iter().find(|(k, _)| !is_valid_env_key(k)) {
                return Err(BerthError::Parse {
                    line: located.line,
                    message: format!("invalid environment variable name: \"{key}\""),
                });
            }
        }
    }
    Ok(())
}

fn check_single_cmd(recipe: &Recipe) -> Result<()> {
    let mut cmds = recipe
        .instructions
        .iter()
        .filter(|l| matches!(l.instruction, Instruction::Cmd(_)));
    let _ = cmds.next();
    if let Some(second) = cmds.next() {
        return Err(BerthError::Parse {
            line: second.line,
            message: "duplicate CMD; exactly one process is launched".into(),
        });
    }
    for located in &recipe.instructions {
        if let Instruction::Cmd(CommandSpec::Shell(s)) | Instruction::Run(CommandSpec::Shell(s)) =
            &located.instruction
        {
            if s.trim().is_empty() {
                return Err(BerthError::Parse {
                    line: located.line,
                    message: "command is empty".into(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::Located;

    fn recipe(instructions: Vec<Instruction>) -> Recipe {
        Recipe {
            instructions: instructions
                .into_iter()
                .enumerate()
                .map(|(i, instruction)| Located {
                    line: i + 1,
                    instruction,
                })
                .collect(),
        }
    }

    fn from() -> Instruction {
        Instruction::From {
            image: "python:3.10-slim".into(),
            alias: None,
        }
    }

    fn copy_all() -> Instruction {
        Instruction::Copy {
            sources: vec![".".into()],
            dest: ".".into(),
        }
    }

    fn run(s: &str) -> Instruction {
        Instruction::Run(CommandSpec::Shell(s.into()))
    }

    #[test]
    fn validate_empty_recipe_fails() {
        let err = validate(&Recipe::default()).unwrap_err();
        assert!(err.to_string().contains("empty"), "got: {err}");
    }

    #[test]
    fn validate_well_ordered_recipe_succeeds() {
        let r = recipe(vec![
            from(),
            Instruction::Workdir("/app".into()),
            copy_all(),
            run("pip install -r requirements.txt"),
            Instruction::Cmd(CommandSpec::Exec(vec!["python".into()])),
        ]);
        assert!(validate(&r).is_ok());
    }

    #[test]
    fn validate_missing_from_fails() {
        let r = recipe(vec![Instruction::Workdir("/app".into())]);
        let err = validate(&r).unwrap_err();
        assert!(err.to_string().contains("must start with FROM"), "got: {err}");
    }

    #[test]
    fn validate_second_from_fails() {
        let r = recipe(vec![from(), from()]);
        let err = validate(&r).unwrap_err();
        assert!(err.to_string().contains("line 2"), "got: {err}");
    }

    #[test]
    fn validate_relative_workdir_fails() {
        let r = recipe(vec![from(), Instruction::Workdir("app".into())]);
        let err = validate(&r).unwrap_err();
        assert!(err.to_string().contains("absolute"), "got: {err}");
    }

    #[test]
    fn validate_duplicate_workdir_fails() {
        let r = recipe(vec![
            from(),
            Instruction::Workdir("/app".into()),
            Instruction::Workdir("/srv".into()),
        ]);
        assert!(validate(&r).is_err());
    }

    #[test]
    fn validate_copy_before_workdir_fails() {
        let r = recipe(vec![from(), copy_all(), Instruction::Workdir("/app".into())]);
        let err = validate(&r).unwrap_err();
        assert!(err.to_string().contains("COPY appears before WORKDIR"), "got: {err}");
    }

    #[test]
    fn validate_run_before_copy_fails() {
        let r = recipe(vec![
            from(),
            Instruction::Workdir("/app".into()),
            run("pip install -r requirements.txt"),
            copy_all(),
        ]);
        let err = validate(&r).unwrap_err();
        assert!(err.to_string().contains("populated first"), "got: {err}");
    }

    #[test]
    fn validate_bad_env_key_fails() {
        let r = recipe(vec![
            from(),
            Instruction::Env(vec![("1BAD".into(), "x".into())]),
        ]);
        let err = validate(&r).unwrap_err();
        assert!(err.to_string().contains("1BAD"), "got: {err}");
    }

    #[test]
    fn validate_duplicate_cmd_fails() {
        let cmd = Instruction::Cmd(CommandSpec::Shell("python api/app.py".into()));
        let r = recipe(vec![from(), Instruction::Workdir("/app".into()), cmd.clone(), cmd]);
        let err = validate(&r).unwrap_err();
        assert!(err.to_string().contains("duplicate CMD"), "got: {err}");
    }

    #[test]
    fn env_key_rules() {
        assert!(is_valid_env_key("PYTHONPATH"));
        assert!(is_valid_env_key("_private1"));
        assert!(!is_valid_env_key(""));
        assert!(!is_valid_env_key("A-B"));
    }
}
