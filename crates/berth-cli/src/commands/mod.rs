//! CLI command definitions and dispatch.

pub mod build;
pub mod init;
pub mod logs;
pub mod plan;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use berth_common::config::BerthConfig;
use clap::{Parser, Subcommand, ValueEnum};

/// Berth: daemon-less service provisioner.
#[derive(Parser, Debug)]
#[command(name = "berth", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory for the journal and provisioning logs [default: `.berth` next to the recipe].
    #[arg(long, global = true, env = "BERTH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Host directory that absolute recipe paths are mapped under.
    #[arg(long, global = true, env = "BERTH_SYSROOT")]
    pub sysroot: Option<PathBuf>,

    /// Diagnostic output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Log progress at info level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Diagnostic output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the default recipe.
    Init(init::InitArgs),
    /// Show the ordered provisioning steps without running them.
    Plan(plan::PlanArgs),
    /// Provision the environment up to installed dependencies.
    Build(build::BuildArgs),
    /// Provision and run the service in the foreground.
    Run(run::RunArgs),
    /// List provisioning attempts.
    Status(status::StatusArgs),
    /// Show the provisioning log of an attempt.
    Logs(logs::LogsArgs),
}

/// Global options every command resolves its configuration from.
#[derive(Debug, Clone)]
pub struct GlobalOpts {
    data_dir: Option<PathBuf>,
    sysroot: Option<PathBuf>,
}

impl GlobalOpts {
    /// Configuration for a recipe at `recipe`.
    #[must_use]
    pub fn config(&self, recipe: &Path) -> BerthConfig {
        let mut config = BerthConfig::for_recipe(recipe);
        if let Some(dir) = &self.data_dir {
            config.data_dir.clone_from(dir);
        }
        config.sysroot.clone_from(&self.sysroot);
        config
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let opts = GlobalOpts {
        data_dir: cli.data_dir,
        sysroot: cli.sysroot,
    };
    match cli.command {
        Command::Init(args) => init::execute(&args),
        Command::Plan(args) => plan::execute(&args),
        Command::Build(args) => build::execute(&args, &opts),
        Command::Run(args) => run::execute(&args, &opts),
        Command::Status(args) => status::execute(&args, &opts),
        Command::Logs(args) => logs::execute(&args, &opts),
    }
}

/// Maps a service exit code onto a process exit status.
///
/// Codes outside `0..=255` become 1.
#[must_use]
pub fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

/// The build context: explicit, or the recipe's directory.
#[must_use]
pub fn context_for(recipe: &Path, context: Option<&Path>) -> PathBuf {
    context.map_or_else(
        || match recipe.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        },
        Path::to_path_buf,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_defaults_to_recipe_directory() {
        assert_eq!(
            context_for(Path::new("svc/Berthfile"), None),
            PathBuf::from("svc")
        );
        assert_eq!(context_for(Path::new("Berthfile"), None), PathBuf::from("."));
        assert_eq!(
            context_for(Path::new("Berthfile"), Some(Path::new("/src"))),
            PathBuf::from("/src")
        );
    }

    #[test]
    fn global_opts_override_config() {
        let opts = GlobalOpts {
            data_dir: Some(PathBuf::from("/var/lib/berth")),
            sysroot: Some(PathBuf::from("/tmp/sys")),
        };
        let config = opts.config(Path::new("svc/Berthfile"));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/berth"));
        assert_eq!(config.host_path(Path::new("/app")), PathBuf::from("/tmp/sys/app"));
    }

    #[test]
    fn service_exit_codes_map_to_process_codes() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(143), 143);
        assert_eq!(exit_status(-1), 1);
        assert_eq!(exit_status(300), 1);
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "berth",
            "build",
            "svc/Berthfile",
            "--sysroot",
            "/tmp/sys",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert_eq!(cli.sysroot, Some(PathBuf::from("/tmp/sys")));
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Command::Build(_)));
    }
}
