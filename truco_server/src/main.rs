//! Truco service host.
//!
//! Bootstraps the ledger, room manager and payment reconciler, then runs the
//! maintenance loop (settlement replay, idle-room collection, intent expiry)
//! until Ctrl+C.

mod config;
mod logging;

use anyhow::Error;
use log::info;
use pico_args::Arguments;
use truco::{Backend, Services};

use config::{Overrides, ServerConfig};

const HELP: &str = "\
Run the truco room, ledger and payment services

USAGE:
  truco_server [OPTIONS]

OPTIONS:
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --memory                 Use the in-memory store instead of PostgreSQL
  --migrate                Apply schema migrations on startup
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string
  PAYOUT_MULTIPLIER_BPS    Winner payout in basis points (default: 18000)
  ROOM_TURN_TIMEOUT_SECS   Seconds before an idle seat is auto-played (default: 30)
  PAYMENT_ACCESS_TOKEN     Payment provider token; deposits are disabled without it
  MAINTENANCE_INTERVAL_SECS  Seconds between maintenance passes (default: 15)
  (See README.md for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = Overrides {
        database_url: pargs.opt_value_from_str("--db-url")?,
        memory: pargs.contains("--memory"),
        migrate: pargs.contains("--migrate"),
    };

    logging::init();

    let config = ServerConfig::from_env(overrides)?;
    config.validate()?;

    match &config.services.backend {
        Backend::Memory => info!("Starting truco services (in-memory store)"),
        Backend::Postgres(_) => info!("Starting truco services (PostgreSQL)"),
    }

    let services = Services::init(config.services)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start services: {}", e))?;
    services
        .health_check()
        .await
        .map_err(|e| anyhow::anyhow!("Store health check failed: {}", e))?;

    info!(
        "Services ready (deposits {}). Press Ctrl+C to stop.",
        if services.deposits.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let mut maintenance = tokio::time::interval(config.maintenance_interval);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = maintenance.tick() => {
                let report = services.run_maintenance().await;
                logging::log_maintenance(&report);
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    log::error!("Failed to listen for Ctrl+C: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down services...");
    services.shutdown().await;

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
