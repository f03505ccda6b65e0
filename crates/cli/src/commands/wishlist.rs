//! Wishlist commands.

use tangogi_cart::CartStore;
use tangogi_cart::storage::KeyValueStorage;
use tangogi_core::{ProductId, WishlistState};
use tracing::info;

use super::report;
use crate::catalog::Catalog;

/// Add or remove a product from the wishlist.
///
/// # Errors
///
/// Returns an error if the product is not in the catalog.
pub fn toggle<S: KeyValueStorage>(
    store: &mut CartStore<S>,
    catalog: &Catalog,
    product_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let product = catalog.get(product_id)?;
    let applied = store.toggle_wishlist(&product.product_id);
    applied.advisories.iter().for_each(report);

    match applied.value {
        WishlistState::Added => info!("{} added to wishlist", product.name),
        WishlistState::Removed => info!("{} removed from wishlist", product.name),
    }
    Ok(())
}

/// Move a wishlisted product into the cart.
///
/// # Errors
///
/// Returns an error if the product is unknown or cannot be added.
pub fn move_to_cart<S: KeyValueStorage>(
    store: &mut CartStore<S>,
    catalog: &Catalog,
    product_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let product = catalog.get(product_id)?;
    let applied = store.move_to_cart(product)?;
    applied.advisories.iter().for_each(report);
    info!("{} moved to cart", product.name);
    Ok(())
}

/// Remove every wishlist entry.
pub fn clear<S: KeyValueStorage>(store: &mut CartStore<S>) {
    let applied = store.clear_wishlist();
    applied.advisories.iter().for_each(report);
    info!("Wishlist has been cleared.");
}

/// Print the wishlist, resolving names through the catalog.
pub fn show<S: KeyValueStorage>(store: &CartStore<S>, catalog: &Catalog) {
    let entries: Vec<ProductId> = store.wishlist_snapshot();
    if entries.is_empty() {
        info!("Your wishlist is empty");
        return;
    }

    for product_id in &entries {
        match catalog.get(product_id.as_str()) {
            Ok(product) => info!(
                %product_id,
                in_stock = product.in_stock,
                "{} ({})",
                product.name,
                product.unit
            ),
            Err(_) => info!(%product_id, "(no longer in catalog)"),
        }
    }
    info!("{} item(s)", entries.len());
}
