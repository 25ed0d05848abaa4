//! Exchange Gateway - reverse proxy with per-route credential exchange

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use exchange_gateway::{
    cli::{Cli, Command},
    config::Config,
    gateway::{Gateway, RouteTable},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Check) => run_check(&cli),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> Option<Config> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host.clone_from(host);
            }
            Some(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            None
        }
    }
}

/// Validate configuration without starting the server
fn run_check(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    match RouteTable::from_config(&config.routes) {
        Ok(routes) => {
            println!("Configuration OK: {} route(s)\n", routes.len());
            for route in routes.iter() {
                let exchange = if route.auth.exchange_enabled {
                    format!(" [exchange via {}]", route.auth.provider_root_url)
                } else {
                    String::new()
                };
                println!(
                    "  {} {} -> {}{}",
                    route.name, route.upstream_path, route.downstream_url, exchange
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the gateway server
async fn run_server(cli: Cli) -> ExitCode {
    let Some(config) = load_config(&cli) else {
        return ExitCode::FAILURE;
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        routes = config.routes.len(),
        "Starting Exchange Gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
