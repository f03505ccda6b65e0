//! Product descriptors supplied by a catalog.
//!
//! The cart never looks products up; callers hand it a resolved descriptor
//! and the cart copies what it needs at add time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// Errors that can occur when validating a [`ProductDescriptor`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    /// The product name is empty.
    #[error("product {0} has an empty name")]
    EmptyName(ProductId),
    /// The unit price is below zero.
    #[error("product {id} has a negative price ({price})")]
    NegativePrice {
        /// Product that failed validation.
        id: ProductId,
        /// The offending price.
        price: Decimal,
    },
}

/// A resolved product as handed to the cart.
///
/// ## Constraints
///
/// - `name` must not be blank
/// - `unit_price` must be zero or positive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDescriptor {
    /// Catalog identifier.
    pub product_id: ProductId,
    /// Price per unit at the moment the product is offered.
    pub unit_price: Decimal,
    /// Display name.
    pub name: String,
    /// Image path or URL.
    #[serde(default)]
    pub image_ref: String,
    /// Sales unit label ("kg", "bunch", "1L").
    #[serde(default)]
    pub unit: String,
    /// Whether the product can currently be added to a cart.
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

const fn default_in_stock() -> bool {
    true
}

impl ProductDescriptor {
    /// Check the descriptor's structural constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the price is negative.
    pub fn validate(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() {
            return Err(ProductError::EmptyName(self.product_id.clone()));
        }

        if self.unit_price.is_sign_negative() && !self.unit_price.is_zero() {
            return Err(ProductError::NegativePrice {
                id: self.product_id.clone(),
                price: self.unit_price,
            });
        }

        Ok(())
    }
}
