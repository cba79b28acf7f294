mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use patchgate_common::Engine;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "patchgate")]
#[command(about = "Validate generated game patches in disposable sandboxes")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ~/.config/patchgate/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a patch and apply it to a project if every stage passes
    Apply {
        /// Live project root
        #[arg(short, long)]
        project: PathBuf,

        /// Engine of the project (bevy, unity)
        #[arg(short, long)]
        engine: Engine,

        /// Patch JSON file
        #[arg(long)]
        patch: PathBuf,
    },
    /// Build and test a whole project in a sandbox
    Compile {
        #[arg(short, long)]
        project: PathBuf,

        #[arg(short, long)]
        engine: Engine,
    },
    /// Extract compiler errors from a build log
    Diagnostics {
        /// Build log file
        log: PathBuf,
    },
    /// Check the container runtime and configured images
    Doctor {
        /// Pull every configured image
        #[arg(long)]
        pull: bool,
    },
    /// Print the effective configuration
    Config {
        /// Write the default configuration if none exists
        #[arg(long)]
        init: bool,
    },
}

fn init_logging(verbose: bool, log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = if verbose { "debug" } else { "info" };
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "patchgate.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "patchgate={},patchgate_sandbox={},patchgate_common={}",
                    log_level, log_level, log_level
                ))
            }),
        )
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_dir.as_ref());
    if let Commands::Config { init: true } = cli.command {
        commands::init_config(cli.config.as_deref())?;
        return Ok(());
    }
    let config = commands::load_config(cli.config.as_deref())?;

    let code = match cli.command {
        Commands::Apply {
            project,
            engine,
            patch,
        } => commands::execute_apply(&config, &project, engine, &patch).await?,
        Commands::Compile { project, engine } => {
            commands::execute_compile(&config, &project, engine).await?
        }
        Commands::Diagnostics { log } => commands::execute_diagnostics(&log)?,
        Commands::Doctor { pull } => commands::execute_doctor(&config, pull).await?,
        Commands::Config { .. } => commands::execute_config(&config)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
