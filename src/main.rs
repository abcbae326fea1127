use clap::Parser;
use gantry::cli::{run_cli, Cli};
use gantry::logging::{init_logging, LogConfig};
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = match init_logging(&LogConfig::from_env()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialise logging: {e:#}");
            return ExitCode::from(2);
        }
    };

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "gantry exited with an error");
            ExitCode::from(2)
        }
    }
}
