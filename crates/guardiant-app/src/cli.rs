use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "guardiant", about = "Guardiant: duress-aware device protection")]
pub struct Cli {
    /// Path to config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up PINs and protected apps for this device
    Provision {
        #[arg(long)]
        normal_pin: String,
        /// PIN that unlocks under duress
        #[arg(long)]
        security_pin: String,
        /// Protected app as `package` or `package=Display Name` (repeatable)
        #[arg(long = "app")]
        apps: Vec<String>,
        #[arg(long, default_value = "extreme")]
        level: String,
    },

    /// Show provisioning status
    Status,

    /// Run the engine, reading platform events as JSON lines on stdin
    Run,
}
