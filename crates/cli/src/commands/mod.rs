//! Subcommand implementations.

pub mod cart;
pub mod catalog;
pub mod watch;
pub mod wishlist;

use tangogi_cart::{Advisory, ChangeEvent, ChangeOrigin, Severity};
use tracing::{error, info, warn};

/// Log an advisory at the level matching its severity.
pub fn report(advisory: &Advisory) {
    match advisory.severity() {
        Severity::Info => info!("{}", advisory.message()),
        Severity::Warning => warn!(?advisory, "{}", advisory.message()),
        Severity::Error => error!(?advisory, "{}", advisory.message()),
    }
}

/// Log a store change notification.
pub fn log_event(event: &ChangeEvent) {
    match event {
        ChangeEvent::CartChanged { lines, origin } => {
            let items: u64 = lines.iter().map(|line| u64::from(line.quantity)).sum();
            info!(
                lines = lines.len(),
                items,
                remote = matches!(origin, ChangeOrigin::Remote),
                "cart changed"
            );
        }
        ChangeEvent::WishlistChanged {
            product_ids,
            origin,
        } => {
            info!(
                entries = product_ids.len(),
                remote = matches!(origin, ChangeOrigin::Remote),
                "wishlist changed"
            );
        }
        ChangeEvent::Advisory(advisory) => report(advisory),
    }
}
