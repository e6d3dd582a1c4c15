//! ifwire - runs one network-configuration module from the command line.
//!
//! The host:
//! - Instantiates a module by type name with positional arguments
//! - Prints each notification (up, down, dead) on stdout
//! - Requests termination on SIGINT/SIGTERM or after `--die-after`
//! - Exits 0 on a clean death, 1 otherwise
//!
//! `ifwire encode` wraps a payload in DHCP client IPv4/UDP headers.

mod args;
mod encode;
mod run;

use args::{Args, Command};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Run(run_args) => run::run(run_args).await,
        Command::Encode(encode_args) => encode::run(encode_args),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("ifwire error: {:#}", e);
            1
        }
    };

    std::process::exit(exit_code);
}
