use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tg_cli::commands::{clear, report, run};
use tg_cli::{Cli, Commands, Config};

/// Load config and open the store, ensuring the parent directory exists.
fn open_store(config: &Config) -> Result<tg_db::Store> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    tg_db::Store::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // stdout carries the protocol, so logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    match &cli.command {
        Some(Commands::Run { framing }) => {
            let mut store = open_store(&config)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start runtime")?;
            runtime.block_on(run::run(
                tokio::io::BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                *framing,
                &mut store,
                &config,
            ))?;
        }
        Some(Commands::Report { json }) => {
            let store = open_store(&config)?;
            report::run(&mut io::stdout().lock(), &store, *json)?;
        }
        Some(Commands::Clear) => {
            let mut store = open_store(&config)?;
            clear::run(&mut io::stdout().lock(), &mut store)?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
