mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use stagehand_core::StagehandError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stagehand",
    about = "Container entry point: wait for the database, migrate, seed on first run, exec the server",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest stagehand.yaml, else built-in defaults)
    #[arg(long, global = true, env = "STAGEHAND_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Full startup sequence ending in the server hand-off (default)
    Run,

    /// Block until the database accepts connections
    Wait {
        /// Override probe.timeout_secs (0 = wait forever)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Wait, bootstrap on first run, upgrade to latest; do not start the server
    Migrate,

    /// Show database reachability, bootstrap marker and migration revisions
    Status,

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Write a default stagehand.yaml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    let default_level = match &command {
        Commands::Run | Commands::Wait { .. } | Commands::Migrate => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };
    init_logging(default_level);

    let config = cli.config.as_deref();
    let result = match command {
        Commands::Run => cmd::run::run(config),
        Commands::Wait { timeout } => cmd::wait::run(config, timeout, cli.json),
        Commands::Migrate => cmd::migrate::run(config, cli.json),
        Commands::Status => cmd::status::run(config, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
        Commands::Init { force } => cmd::init::run(config, force),
    };

    if let Err(e) = result {
        let code = e
            .downcast_ref::<StagehandError>()
            .map(StagehandError::exit_code)
            .unwrap_or(1);
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(code);
    }
}

/// Human-readable logs by default; JSON lines in production
/// (`APP_ENV=production`) or when `STAGEHAND_LOG_FORMAT=json`.
fn init_logging(default_level: tracing::Level) {
    let json = std::env::var("STAGEHAND_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
        || std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
