//! Alerta CLI - Community incident reports from the command line
//!
//! List, follow and submit neighbourhood reports on the shared live map.

mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::list::run_list;
use crate::commands::report::{run_report, LocationSource};
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "alerta=info"
        .parse()
        .map_err(|error| CliError::Config(format!("Invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::List { limit, json } => run_list(limit, json, profile).await?,
        Commands::Watch { json } => run_watch(json, profile).await?,
        Commands::Report {
            zone,
            message,
            lat,
            lng,
            device,
            json,
        } => {
            let location = LocationSource::from_args(lat, lng, device);
            run_report(&zone, &message, location, json, profile).await?;
        }
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
        Commands::Config { command } => run_config(command, profile)?,
    }

    Ok(())
}
