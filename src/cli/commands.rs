use super::demo::build_demo;
use crate::config::AppConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

/// Command-line interface for gantry.
#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "gantry demo server", long_about = None, version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the demo application
    Serve {
        /// Path to the YAML (or JSON) config file; defaults apply when omitted
        #[arg(short, long, env = "GANTRY_CONFIG")]
        config: Option<PathBuf>,

        /// Override the bind address from the config file
        #[arg(long)]
        bind: Option<String>,

        /// Override the port from the config file
        #[arg(short, long)]
        port: Option<u16>,

        /// Retry on the next port when the port is taken
        #[arg(long, default_value_t = false)]
        port_inc: bool,
    },
    /// Validate a config file and print the effective settings
    CheckConfig {
        #[arg(short, long, env = "GANTRY_CONFIG")]
        config: PathBuf,
    },
}

pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            config,
            bind,
            port,
            port_inc,
        } => {
            let mut app_config = load_config(config.as_deref())?;
            if let Some(bind) = bind {
                app_config.bind = bind;
            }
            if let Some(port) = port {
                app_config.port = port;
            }
            app_config.port_increment |= port_inc;
            info!(addr = %app_config.connection_string(), "starting demo application");
            let app = build_demo(app_config)?;
            app.run().context("server failed")?;
        }
        Commands::CheckConfig { config } => {
            let app_config = load_config(Some(&config))?;
            println!("{}", serde_yaml::to_string(&app_config)?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => Ok(AppConfig::from_file(path)?),
        None => Ok(AppConfig::default()),
    }
}
