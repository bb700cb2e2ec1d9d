use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pa_core::{Resolution, SystemClock, shared};
use tracing_subscriber::EnvFilter;

use pa_cli::commands::{answer, events, run, sessions, status};
use pa_cli::{Cli, Commands, Config};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(pa_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = pa_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Some(Commands::Run) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            config
                .validate()
                .context("invalid tracker configuration")?;
            run::run(&config, db).await?;
        }
        Some(Commands::Answer { response, skip }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            let resolution = match (response, skip) {
                (Some(value), false) => Resolution::Answer(value),
                _ => Resolution::Skip,
            };
            answer::run(
                &mut io::stdout(),
                shared(db),
                Arc::new(SystemClock),
                resolution,
            )
            .await?;
        }
        Some(Commands::Sessions { limit, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            sessions::run(&mut io::stdout(), &db, limit, json)?;
        }
        Some(Commands::Events { after, before }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            events::run(&mut io::stdout(), &db, after.as_deref(), before.as_deref())?;
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut io::stdout(), &db, &config)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
