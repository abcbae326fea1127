//! # CLI Module
//!
//! Command-line entry points for the `gantry` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Start the demo application described by a config file:
//!
//! ```bash
//! gantry serve --config demo/config.yaml
//! gantry serve --config demo/config.yaml --port 8080 --port-inc
//! ```
//!
//! The demo mounts an index page, a login form, a session-protected account
//! page and two token-aware JSON endpoints. Users and API tokens come from the
//! `app_config` section of the config file:
//!
//! ```yaml
//! app_config:
//!   users:
//!     alice: wonderland
//!   api_tokens: [t0ps3cret]
//! ```
//!
//! ### `check-config`
//!
//! Parse and validate a config file, then print the effective settings:
//!
//! ```bash
//! gantry check-config --config demo/config.yaml
//! ```
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use gantry::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! run_cli(Cli::parse())?;
//! ```

mod commands;
mod demo;


pub use commands::{run_cli, Cli, Commands};
pub use demo::{build_demo, DemoChecker};
