//! Catalog listing.

use tracing::info;

use crate::catalog::{Catalog, CatalogEntry};

/// Print catalog products, optionally only those in `category`.
pub fn list(catalog: &Catalog, category: Option<&str>) {
    let entries: Vec<&CatalogEntry> = match category {
        Some(category) => catalog.in_category(category).collect(),
        None => catalog.entries().iter().collect(),
    };

    if entries.is_empty() {
        info!(
            "No products found. Categories: {}",
            catalog.categories().join(", ")
        );
        return;
    }

    for entry in entries {
        let product = &entry.product;
        info!(
            product_id = %product.product_id,
            category = %entry.category,
            in_stock = product.in_stock,
            "{} - {} per {}",
            product.name,
            product.unit_price,
            product.unit
        );
    }
}
