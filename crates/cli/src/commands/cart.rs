//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! # Add two kilos of tomatoes
//! tangogi cart add prod-001 -q 2
//!
//! # Change a line's quantity (line id or product id)
//! tangogi cart set prod-001 5
//!
//! # Remove a line
//! tangogi cart remove prod-001
//!
//! # Show lines and totals
//! tangogi cart show
//! ```

use tangogi_cart::storage::KeyValueStorage;
use tangogi_cart::{CartStore, QuantityChange};
use tangogi_core::{LineId, Price, ProductId};
use tracing::info;

use super::report;
use crate::catalog::{Catalog, CatalogError};

/// Add a catalog product to the cart.
///
/// # Errors
///
/// Returns an error if the product is unknown or the store refuses it.
pub fn add<S: KeyValueStorage>(
    store: &mut CartStore<S>,
    catalog: &Catalog,
    product_id: &str,
    quantity: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let product = catalog.get(product_id)?;
    let applied = store.add_to_cart(product, quantity)?;
    applied.advisories.iter().for_each(report);

    info!(
        line_id = %applied.value.line_id,
        quantity = applied.value.quantity,
        "{} added to cart!",
        product.name
    );
    Ok(())
}

/// Remove a line.
///
/// # Errors
///
/// Returns an error if `line` is neither a line id nor a product id.
pub fn remove<S: KeyValueStorage>(
    store: &mut CartStore<S>,
    line: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(line_id) = resolve_line(store, line)? else {
        info!("{line} is not in the cart");
        return Ok(());
    };

    let applied = store.remove_from_cart(line_id);
    applied.advisories.iter().for_each(report);
    if applied.value {
        info!("Item removed from cart");
    } else {
        info!("{line} is not in the cart");
    }
    Ok(())
}

/// Set a line's quantity.
///
/// # Errors
///
/// Returns an error if `line` is neither a line id nor a product id.
pub fn set<S: KeyValueStorage>(
    store: &mut CartStore<S>,
    line: &str,
    quantity: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(line_id) = resolve_line(store, line)? else {
        info!("{line} is not in the cart");
        return Ok(());
    };

    let applied = store.set_quantity(line_id, quantity);
    applied.advisories.iter().for_each(report);
    match applied.value {
        QuantityChange::Updated(line) => info!(quantity = line.quantity, "{} updated", line.name),
        QuantityChange::Removed(line) => info!("{} removed from cart", line.name),
        QuantityChange::Missing => info!("{line} is not in the cart"),
    }
    Ok(())
}

/// Empty the cart.
pub fn clear<S: KeyValueStorage>(store: &mut CartStore<S>) {
    let applied = store.clear_cart();
    applied.advisories.iter().for_each(report);
    info!("Cart cleared");
}

/// Print cart lines and totals.
pub fn show<S: KeyValueStorage>(store: &CartStore<S>) {
    let lines = store.cart_snapshot();
    if lines.is_empty() {
        info!("Your cart is empty");
        return;
    }

    let currency = store.config().currency;
    for line in &lines {
        info!(
            line_id = %line.line_id,
            product_id = %line.product_id,
            "{} x{} ({}) @ {} = {}",
            line.name,
            line.quantity,
            line.unit,
            Price::new(line.unit_price, currency),
            Price::new(line.line_total(), currency)
        );
    }

    let totals = store.compute_totals();
    info!("Items:    {}", totals.item_count);
    info!("Subtotal: {}", totals.subtotal_price());
    info!("Tax:      {}", totals.tax_price());
    info!("Shipping: {}", totals.shipping_price());
    info!("Total:    {}", totals.total_price());
}

/// Resolve a command-line line reference: a line id, or the id of a product
/// in the cart.
fn resolve_line<S: KeyValueStorage>(
    store: &CartStore<S>,
    reference: &str,
) -> Result<Option<LineId>, CatalogError> {
    if let Ok(line_id) = reference.parse::<LineId>() {
        return Ok(Some(line_id));
    }

    let product_id = ProductId::parse(reference)
        .map_err(|_| CatalogError::UnknownProduct(reference.to_string()))?;
    Ok(store
        .line_for_product(&product_id)
        .map(|line| line.line_id))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tangogi_cart::StoreConfig;
    use tangogi_cart::storage::MemoryStorage;

    use super::*;

    fn store_with_tomatoes() -> (CartStore<MemoryStorage>, LineId) {
        let catalog = Catalog::builtin().unwrap();
        let mut store = CartStore::open(MemoryStorage::new(), StoreConfig::default()).into_value();
        let line = store
            .add_to_cart(catalog.get("prod-001").unwrap(), 1)
            .unwrap()
            .into_value();
        (store, line.line_id)
    }

    #[test]
    fn test_resolve_line_by_line_id() {
        let (store, line_id) = store_with_tomatoes();
        assert_eq!(
            resolve_line(&store, &line_id.to_string()).unwrap(),
            Some(line_id)
        );

        // A well-formed id is passed through even if no line has it.
        let other = LineId::generate();
        assert_eq!(resolve_line(&store, &other.to_string()).unwrap(), Some(other));
    }

    #[test]
    fn test_resolve_line_by_product_id() {
        let (store, line_id) = store_with_tomatoes();
        assert_eq!(resolve_line(&store, "prod-001").unwrap(), Some(line_id));
    }

    #[test]
    fn test_resolve_unknown_reference() {
        let (store, _) = store_with_tomatoes();
        assert_eq!(resolve_line(&store, "prod-999").unwrap(), None);
        assert!(matches!(
            resolve_line(&store, "   "),
            Err(CatalogError::UnknownProduct(_))
        ));
    }
}
