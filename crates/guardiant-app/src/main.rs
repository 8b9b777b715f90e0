mod adapters;
mod cli;
mod commands;
mod runner;
mod setup;

use anyhow::Result;
use clap::Parser;
use guardiant_core::config::AppConfig;
use guardiant_core::lifecycle;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    lifecycle::init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref());

    match cli.command {
        Commands::Provision {
            normal_pin,
            security_pin,
            apps,
            level,
        } => commands::provision(&config, normal_pin, security_pin, apps, level).await?,
        Commands::Status => commands::status(&config).await?,
        Commands::Run => {
            lifecycle::log_startup(&config.device.device_id);
            runner::run(&config).await?;
            lifecycle::log_shutdown();
        }
    }

    Ok(())
}
