mod cli;
mod config;
mod executors;
mod launch;
mod report;

use clap::Parser;
use cli::{Cli, Commands};
use config::SweepConfig;
use executors::Executors;
use launch::ProcessLauncher;
use std::process::exit;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_unwrap::ResultExt;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = SweepConfig::load(cli.config.as_deref()).unwrap_or_log();

    if let Commands::Config = cli.command {
        print!("{}", serde_yaml::to_string(&config).unwrap_or_log());
        return;
    }

    let mut executor = Executors::load(config, &cli.command, ProcessLauncher).unwrap_or_log();

    if let Err(error) = executor.execute() {
        error!("{error}");
        exit(1);
    }
}
