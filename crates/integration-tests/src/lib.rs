//! Integration tests for the Tangogi cart store.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tangogi-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_store` - Store operations end to end over shared storage
//! - `cross_tab_sync` - Two stores on one in-memory origin
//! - `file_storage` - Two stores on one data directory
//!
//! This crate only carries fixtures shared by the test files.

use rust_decimal::Decimal;
use tangogi_core::{ProductDescriptor, ProductId};

/// An in-stock product priced in whole units.
///
/// # Panics
///
/// Panics if `id` is not a valid product id.
#[must_use]
#[allow(clippy::expect_used)]
pub fn product(id: &str, name: &str, price: i64) -> ProductDescriptor {
    ProductDescriptor {
        product_id: ProductId::parse(id).expect("fixture product id"),
        unit_price: Decimal::from(price),
        name: name.to_string(),
        image_ref: format!("images/products/{id}.jpg"),
        unit: "kg".to_string(),
        in_stock: true,
    }
}

/// Same as [`product`] but marked out of stock.
#[must_use]
pub fn sold_out(id: &str, name: &str, price: i64) -> ProductDescriptor {
    ProductDescriptor {
        in_stock: false,
        ..product(id, name, price)
    }
}

/// Fresh Tomatoes, 1200 per kg.
#[must_use]
pub fn tomatoes() -> ProductDescriptor {
    product("prod-001", "Fresh Tomatoes", 1200)
}

/// Bell Peppers, 800 per kg.
#[must_use]
pub fn peppers() -> ProductDescriptor {
    product("prod-002", "Bell Peppers", 800)
}
