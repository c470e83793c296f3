use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;
use mkksiso::Builder;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mkksiso={},warn", log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mkksiso v{} starting", env!("CARGO_PKG_VERSION"));

    let options = cli.into_options();
    let output = options.output_iso.clone();
    let result = Builder::new(options)
        .build()
        .with_context(|| format!("Failed to create {}", output.display()));

    match result {
        Ok(()) => {
            info!("✓ Kickstart ISO written to {}", output.display());
            Ok(())
        }
        Err(e) => {
            error!("✗ {:#}", e);
            std::process::exit(1);
        }
    }
}
