pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "relist",
    about = "Relist operator CLI",
    long_about = "Operate the relist recommendation engine: migrations, demo fixtures, config inspection, and smoke validation.",
    after_help = "Examples:\n  relist doctor --json\n  relist config\n  relist smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo inventory and sale history")]
    Seed,
    #[command(
        about = "Run end-to-end readiness checks with per-check timing details, including a scripted recommendation cycle"
    )]
    Smoke,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, content-service readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

/// Install the tracing subscriber for the CLI process. Level and format
/// follow the same environment variables the config layer reads.
pub fn init_tracing() {
    let level = std::env::var("RELIST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let result = match std::env::var("RELIST_LOG_FORMAT").ok().as_deref() {
        Some("json") => builder.json().try_init(),
        Some("pretty") => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };
    // A second init (tests, embedding) is not an error worth surfacing.
    let _ = result;
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Smoke => commands::smoke::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
