mod auth;
mod commands;
mod config;
mod error;
mod hub;
mod jobs;
mod monitor;
mod pointer;
mod readme;
mod script_meta;
mod templates;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::ps::PsArgs;
use commands::run::RunArgs;
use commands::scripts::ScriptsArgs;
use commands::uv::UvArgs;
use commands::{AppContext, Command};
use error::HfJobsError;

#[derive(Parser)]
#[command(name = "hfjobs", version)]
#[command(about = "Run jobs on Hugging Face infrastructure and share UV scripts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to ~/.config/hfjobs/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job
    Run(RunArgs),
    /// List jobs
    Ps(PsArgs),
    /// Share UV scripts as dataset repositories
    Scripts(ScriptsArgs),
    /// Manage a local collection of UV scripts and run them
    Uv(UvArgs),
}

impl Commands {
    async fn run(&self, ctx: &AppContext) -> anyhow::Result<()> {
        match self {
            Commands::Run(args) => args.run(ctx).await,
            Commands::Ps(args) => args.run(ctx).await,
            Commands::Scripts(args) => args.run(ctx).await,
            Commands::Uv(args) => args.run(ctx).await,
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "hfjobs=warn",
        1 => "hfjobs=info",
        2 => "hfjobs=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    };

    let result = match AppContext::load(cli.config.as_deref()) {
        Ok(ctx) => command.run(&ctx).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        // The monitor has already reported the failure
        Err(e) if matches!(e.downcast_ref::<HfJobsError>(), Some(HfJobsError::JobFailed { .. })) => {
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["hfjobs", "ps", "-a", "-vv", "--config", "/tmp/c.toml"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Some(Commands::Ps(PsArgs { all: true, .. }))));
    }

    #[test]
    fn test_uv_run_splits_options_and_script_args() {
        let cli = Cli::try_parse_from([
            "hfjobs",
            "uv",
            "run",
            "--repo",
            "tools",
            "--python",
            "3.11",
            "-d",
            "fetch.py",
            "--limit",
            "5",
        ])
        .unwrap();

        let Some(Commands::Uv(UvArgs {
            command: commands::uv::UvCommand::Run(args),
        })) = cli.command
        else {
            panic!("expected uv run");
        };
        assert_eq!(args.repo.as_deref(), Some("tools"));
        assert_eq!(args.python, "3.11");
        assert!(args.job.detach);
        assert_eq!(args.script, PathBuf::from("fetch.py"));
        assert_eq!(args.script_args, vec!["--limit", "5"]);
    }

    #[test]
    fn test_missing_subcommand_parses_to_none() {
        let cli = Cli::try_parse_from(["hfjobs"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_help_is_not_an_error_exit() {
        let err = Cli::try_parse_from(["hfjobs", "--help"]).err().unwrap();
        assert!(!err.use_stderr());
    }
}
