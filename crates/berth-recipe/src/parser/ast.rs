//! Abstract Syntax Tree for recipe files.

use std::fmt;

use berth_common::types::PortSpec;
use serde::{Deserialize, Serialize};

/// Root node of a parsed recipe.
#[derive(Debug, Clone, Default)]
pub struct Recipe {
    /// Instructions in source order.
    pub instructions: Vec<Located>,
}

impl Recipe {
    /// Iterates over the bare instructions, dropping line numbers.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().map(|l| &l.instruction)
    }
}

/// An instruction paired with the line it started on.
#[derive(Debug, Clone)]
pub struct Located {
    /// 1-based source line.
    pub line: usize,
    /// The instruction itself.
    pub instruction: Instruction,
}

/// A single recipe instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `FROM image [AS alias]`.
    From {
        /// Base runtime image reference.
        image: String,
        /// Optional stage alias.
        alias: Option<String>,
    },
    /// `WORKDIR path`.
    Workdir(String),
    /// `ENV` assignments, in the order written.
    Env(Vec<(String, String)>),
    /// `COPY src... dest`.
    Copy {
        /// Sources relative to the build context.
        sources: Vec<String>,
        /// Destination, relative to the root unless absolute.
        dest: String,
    },
    /// `RUN` command.
    Run(CommandSpec),
    /// `EXPOSE` ports.
    Expose(Vec<PortSpec>),
    /// `CMD` entrypoint.
    Cmd(CommandSpec),
}

impl Instruction {
    /// Upper-case keyword, for messages.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::From { .. } => "FROM",
            Self::Workdir(_) => "WORKDIR",
            Self::Env(_) => "ENV",
            Self::Copy { .. } => "COPY",
            Self::Run(_) => "RUN",
            Self::Expose(_) => "EXPOSE",
            Self::Cmd(_) => "CMD",
        }
    }
}

/// A command in shell form or exec (JSON array) form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandSpec {
    /// Run through `/bin/sh -c`.
    Shell(String),
    /// Executed directly, first element is the program.
    Exec(Vec<String>),
}

impl CommandSpec {
    /// The argument vector handed to the OS.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        match self {
            Self::Shell(line) => vec!["/bin/sh".into(), "-c".into(), line.clone()],
            Self::Exec(args) => args.clone(),
        }
    }

    /// Whitespace-separated words of the command as written.
    ///
    /// Used for scanning options such as `-r requirements.txt`; shell
    /// quoting is not interpreted.
    #[must_use]
    pub fn words(&self) -> Vec<String> {
        match self {
            Self::Shell(line) => line.split_whitespace().map(String::from).collect(),
            Self::Exec(args) => args.clone(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell(line) => write!(f, "{line}"),
            Self::Exec(args) => write!(f, "{}", args.join(" ")),
        }
    }
}
