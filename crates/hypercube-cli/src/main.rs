//! HyperCube CLI entry point

use std::path::Path;

use clap::Parser;
use tracing::{debug, error};

use hypercube_cli::{Cli, CliOverrides, CommandDispatcher, AppConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        server: cli.server.clone(),
        port: cli.port,
        name: cli.name.clone(),
        group: cli.group.clone(),
        verbose: cli.verbose,
    };
    let config = match AppConfig::load(cli.config.as_deref().map(Path::new), &overrides) {
        Ok(config) => config,
        Err(e) => {
            setup_logging(cli.verbose);
            error!("{}", e);
            std::process::exit(1);
        }
    };

    setup_logging(config.cli.verbose);
    debug!("Effective configuration: {:?}", config);

    if let Err(e) = CommandDispatcher::execute(cli.command(), config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
