use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rt_cli::commands::{annotations, batch, formats, ingest, rank, strategy};
use rt_cli::{Cli, Commands, Config};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut stdout = std::io::stdout().lock();

    match &cli.command {
        Some(Commands::Formats) => {
            // Formats are static, no config needed
            formats::run(&mut stdout)?;
        }
        Some(Commands::Ingest {
            format,
            files,
            out,
            json,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            ingest::run(&mut stdout, &config, *format, files, out.as_deref(), *json)?;
        }
        Some(Commands::Batch { manifest }) => {
            let config = load_config(cli.config.as_deref())?;
            batch::run(&mut stdout, &config, manifest)?;
        }
        Some(Commands::Strategy {
            dataset,
            class,
            json,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            strategy::run(&mut stdout, &config.scoring, dataset, class.as_deref(), *json)?;
        }
        Some(Commands::Rank {
            dataset,
            class,
            lap,
            json,
        }) => {
            rank::run(&mut stdout, dataset, class.as_deref(), *lap, *json)?;
        }
        Some(Commands::Annotations { dataset, car, json }) => {
            annotations::run(&mut stdout, dataset, car, *json)?;
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
