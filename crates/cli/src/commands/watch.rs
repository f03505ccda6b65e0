//! Follow cart changes made by other processes sharing the data directory.
//!
//! Each poll rescans the directory, publishes the files that changed since the
//! last scan, and lets the store replace its state wholesale. Runs until
//! Ctrl-C.

use std::time::Duration;

use tangogi_cart::CartStore;
use tangogi_cart::storage::FileStorage;
use tracing::{info, warn};

use super::{cart, log_event};

/// Poll for external writes every `interval` until interrupted.
///
/// # Errors
///
/// Returns an error if the Ctrl-C handler cannot be installed.
pub async fn run(
    store: &mut CartStore<FileStorage>,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let subscription = store.subscribe(log_event);

    info!(
        dir = %store.persistence().storage().dir().display(),
        interval_ms = interval.as_millis(),
        "Watching for cart changes (Ctrl-C to stop)"
    );
    cart::show(store);

    let mut ticker = tokio::time::interval(interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = ticker.tick() => {
                match store.persistence().storage().poll_changes() {
                    Ok(0) => {}
                    Ok(changed) => {
                        let applied = store.sync_external();
                        if applied > 0 {
                            info!(changed, applied, "applied external changes");
                            cart::show(store);
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to scan data directory"),
                }
            }
        }
    }

    subscription.unsubscribe();
    info!("Stopped watching");
    Ok(())
}
