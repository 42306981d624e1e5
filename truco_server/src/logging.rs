//! Structured logging configuration.
//!
//! The library logs through the `log` facade; the subscriber installed here
//! picks those records up alongside native `tracing` events.

use truco::MaintenanceReport;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels come from `RUST_LOG` (default: `info,sqlx=warn`).
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a maintenance pass that did any work
pub fn log_maintenance(report: &MaintenanceReport) {
    if *report == MaintenanceReport::default() {
        return;
    }
    if report.settlements_rejected > 0 {
        tracing::warn!(
            settlements_rejected = report.settlements_rejected,
            "SETTLEMENT: rejected settlements need an operator"
        );
    }
    tracing::info!(
        settlements_applied = report.settlements_applied,
        settlements_queued = report.settlements_queued,
        rooms_collected = report.rooms_collected,
        intents_expired = report.intents_expired,
        "Maintenance pass completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_maintenance() {
        log_maintenance(&MaintenanceReport::default());
        log_maintenance(&MaintenanceReport {
            settlements_applied: 1,
            ..MaintenanceReport::default()
        });
        log_maintenance(&MaintenanceReport {
            settlements_rejected: 1,
            ..MaintenanceReport::default()
        });
    }
}
