//! Auto-sync functionality for CLI commands.
//!
//! Delivers queued stock movements before read operations when `auto_sync`
//! is enabled in the configuration.

use tracing::debug;

use crate::config::Config;
use crate::sync::open_coordinator;

/// Runs a flush cycle if auto-sync is enabled.
///
/// Failures are printed and otherwise ignored: the command that follows
/// still works offline against the local cache.
pub async fn try_auto_sync(config: &Config) {
    if !config.server.auto_sync || !config.server.is_configured() {
        debug!("auto-sync disabled");
        return;
    }

    let coordinator = match open_coordinator(config).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Auto-sync: {}", e);
            return;
        }
    };

    match coordinator.flush().await {
        Ok(report) if report.delivered > 0 => {
            eprintln!(
                "Auto-sync: delivered {} queued movement(s)",
                report.delivered
            );
        }
        Ok(_) => debug!("auto-sync: outbox empty"),
        Err(e) => {
            eprintln!("Auto-sync: {}", e);
        }
    }
}
