//! Recipe parser built on `nom`.
//!
//! Transforms raw recipe text into a validated AST through lexing,
//! per-instruction argument parsing, and static analysis phases.

pub mod ast;
pub mod lexer;
pub mod validator;

use berth_common::error::{BerthError, Result};
use berth_common::types::PortSpec;

use self::ast::{CommandSpec, Instruction, Located, Recipe};
use self::lexer::{Keyword, LogicalLine};

const fn parse_err(line: usize, message: String) -> BerthError {
    BerthError::Parse { line, message }
}

/// Parses a recipe from its source text.
///
/// # Errors
///
/// Returns an error if the input contains syntax errors or fails validation.
pub fn parse_recipe(input: &str) -> Result<Recipe> {
    tracing::info!("parsing recipe");
    let lines = lexer::tokenize(input)?;
    let mut recipe = Recipe::default();
    for line in &lines {
        recipe.instructions.push(Located {
            line: line.line,
            instruction: parse_instruction(line)?,
        });
    }
    validator::validate(&recipe)?;
    Ok(recipe)
}

fn parse_instruction(line: &LogicalLine) -> Result<Instruction> {
    match line.keyword {
        Keyword::From => parse_from(line),
        Keyword::Workdir => parse_workdir(line),
        Keyword::Env => parse_env(line),
        Keyword::Copy => parse_copy(line),
        Keyword::Run => parse_command(line).map(Instruction::Run),
        Keyword::Expose => parse_expose(line),
        Keyword::Cmd => parse_command(line).map(Instruction::Cmd),
    }
}

fn parse_from(line: &LogicalLine) -> Result<Instruction> {
    let words = lexer::split_words(&line.rest, line.line)?;
    match words.as_slice() {
        [image] => Ok(Instruction::From {
            image: image.clone(),
            alias: None,
        }),
        [image, as_kw, alias] if as_kw.eq_ignore_ascii_case("AS") => Ok(Instruction::From {
            image: image.clone(),
            alias: Some(alias.clone()),
        }),
        _ => Err(parse_err(
            line.line,
            format!("FROM expects `image [AS name]`, got \"{}\"", line.rest),
        )),
    }
}

fn parse_workdir(line: &LogicalLine) -> Result<Instruction> {
    let words = lexer::split_words(&line.rest, line.line)?;
    match words.as_slice() {
        [path] => Ok(Instruction::Workdir(path.clone())),
        _ => Err(parse_err(
            line.line,
            format!("WORKDIR expects exactly one path, got \"{}\"", line.rest),
        )),
    }
}

fn parse_env(line: &LogicalLine) -> Result<Instruction> {
    let words = lexer::split_words(&line.rest, line.line)?;
    let Some(first) = words.first() else {
        return Err(parse_err(line.line, "ENV requires at least one assignment".into()));
    };

    if first.contains('=') {
        let mut pairs = Vec::with_capacity(words.len());
        for w in &words {
            let (key, value) = w.split_once('=').ok_or_else(|| {
                parse_err(line.line, format!("expected KEY=VALUE, got \"{w}\""))
            })?;
            pairs.push((key.to_string(), value.to_string()));
        }
        return Ok(Instruction::Env(pairs));
    }

    // Legacy `ENV KEY value with spaces` form.
    let value = line
        .rest
        .split_once(char::is_whitespace)
        .map(|(_, v)| v.trim().to_string())
        .unwrap_or_default();
    if value.is_empty() {
        return Err(parse_err(line.line, format!("ENV {first} has no value")));
    }
    Ok(Instruction::Env(vec![(first.clone(), value)]))
}

fn parse_copy(line: &LogicalLine) -> Result<Instruction> {
    let mut words = match lexer::json_array(&line.rest) {
        Some(items) => items,
        None => lexer::split_words(&line.rest, line.line)?,
    };
    if let Some(flag) = words.iter().find(|w| w.starts_with("--")) {
        return Err(parse_err(line.line, format!("unsupported COPY flag {flag}")));
    }
    if words.len() < 2 {
        return Err(parse_err(
            line.line,
            "COPY expects at least one source and a destination".into(),
        ));
    }
    let dest = words.pop().unwrap_or_default();
    Ok(Instruction::Copy {
        sources: words,
        dest,
    })
}

fn parse_command(line: &LogicalLine) -> Result<CommandSpec> {
    if line.rest.is_empty() {
        return Err(parse_err(line.line, "command is empty".into()));
    }
    match lexer::json_array(&line.rest) {
        Some(args) if args.is_empty() => {
            Err(parse_err(line.line, "exec form array is empty".into()))
        }
        Some(args) => Ok(CommandSpec::Exec(args)),
        None => Ok(CommandSpec::Shell(line.rest.clone())),
    }
}

fn parse_expose(line: &LogicalLine) -> Result<Instruction> {
    let words = lexer::split_words(&line.rest, line.line)?;
    if words.is_empty() {
        return Err(parse_err(line.line, "EXPOSE requires at least one port".into()));
    }
    let ports = words
        .iter()
        .map(|w| {
            w.parse::<PortSpec>()
                .map_err(|e| parse_err(line.line, e.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Instruction::Expose(ports))
}

#[cfg(test)]
mod tests {
    use berth_common::constants::DEFAULT_RECIPE;

    use super::*;

    fn instructions(input: &str) -> Vec<Instruction> {
        parse_recipe(input)
            .expect("should parse")
            .iter()
            .cloned()
            .collect()
    }

    #[test]
    fn parse_default_recipe() {
        let ins = instructions(DEFAULT_RECIPE);
        assert_eq!(ins.len(), 7);
        assert_eq!(
            ins[0],
            Instruction::From {
                image: "python:3.10-slim".into(),
                alias: None
            }
        );
        assert_eq!(ins[1], Instruction::Workdir("/app".into()));
        assert_eq!(
            ins[2],
            Instruction::Env(vec![("PYTHONPATH".into(), "/app".into())])
        );
        assert_eq!(
            ins[3],
            Instruction::Copy {
                sources: vec![".".into()],
                dest: ".".into()
            }
        );
        assert_eq!(
            ins[4],
            Instruction::Run(CommandSpec::Shell(
                "pip install --no-cache-dir -r requirements.txt".into()
            ))
        );
        assert_eq!(ins[5], Instruction::Expose(vec![PortSpec::tcp(5000)]));
        assert_eq!(
            ins[6],
            Instruction::Cmd(CommandSpec::Exec(vec!["python".into(), "api/app.py".into()]))
        );
    }

    #[test]
    fn parse_from_with_alias() {
        let ins = instructions("FROM python:3.12 AS runtime\nWORKDIR /srv");
        assert_eq!(
            ins[0],
            Instruction::From {
                image: "python:3.12".into(),
                alias: Some("runtime".into())
            }
        );
    }

    #[test]
    fn parse_env_multiple_pairs_and_quotes() {
        let ins = instructions("FROM b\nENV A=1 GREETING=\"hello world\"");
        assert_eq!(
            ins[1],
            Instruction::Env(vec![
                ("A".into(), "1".into()),
                ("GREETING".into(), "hello world".into())
            ])
        );
    }

    #[test]
    fn parse_env_legacy_form_keeps_spaces() {
        let ins = instructions("FROM b\nENV MOTD welcome to  berth");
        assert_eq!(
            ins[1],
            Instruction::Env(vec![("MOTD".into(), "welcome to  berth".into())])
        );
    }

    #[test]
    fn parse_env_legacy_form_without_value_fails() {
        assert!(parse_recipe("FROM b\nENV LONELY").is_err());
    }

    #[test]
    fn parse_copy_json_form() {
        let ins = instructions("FROM b\nWORKDIR /app\nCOPY [\"api\", \"flows\", \"./\"]");
        assert_eq!(
            ins[2],
            Instruction::Copy {
                sources: vec!["api".into(), "flows".into()],
                dest: "./".into()
            }
        );
    }

    #[test]
    fn parse_copy_rejects_flags() {
        let err = parse_recipe("FROM b\nWORKDIR /app\nCOPY --chown=app . .").unwrap_err();
        assert!(err.to_string().contains("--chown"), "got: {err}");
    }

    #[test]
    fn parse_copy_requires_destination() {
        assert!(parse_recipe("FROM b\nWORKDIR /app\nCOPY .").is_err());
    }

    #[test]
    fn parse_run_shell_form_with_brackets() {
        let ins = instructions("FROM b\nWORKDIR /a\nCOPY . .\nRUN [ -f x ] || true");
        assert_eq!(
            ins[3],
            Instruction::Run(CommandSpec::Shell("[ -f x ] || true".into()))
        );
    }

    #[test]
    fn parse_cmd_empty_exec_array_fails() {
        assert!(parse_recipe("FROM b\nWORKDIR /a\nCMD []").is_err());
    }

    #[test]
    fn parse_expose_multiple_ports() {
        let ins = instructions("FROM b\nEXPOSE 5000 8125/udp");
        let Instruction::Expose(ports) = &ins[1] else {
            panic!("expected EXPOSE");
        };
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[1].to_string(), "8125/udp");
    }

    #[test]
    fn parse_expose_out_of_range_reports_line() {
        let err = parse_recipe("FROM b\n\nEXPOSE 99999").unwrap_err();
        assert!(err.to_string().contains("line 3"), "got: {err}");
    }

    #[test]
    fn parse_workdir_rejects_two_paths() {
        assert!(parse_recipe("FROM b\nWORKDIR /a /b").is_err());
    }
}
