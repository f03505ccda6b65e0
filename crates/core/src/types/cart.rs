//! Cart and wishlist value types.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::id::{LineId, ProductId};
use super::price::{CurrencyCode, Price};
use super::product::ProductDescriptor;

/// One product entry in the cart.
///
/// Serialized with camelCase keys:
/// `{ lineId, productId, name, imageRef, unit, unitPrice, quantity }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub line_id: LineId,
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub image_ref: String,
    #[serde(default)]
    pub unit: String,
    /// Price captured when the line was created.
    pub unit_price: Decimal,
    /// Always at least 1 for a line held by the store.
    pub quantity: u32,
}

impl CartLine {
    /// Create a new line for `product` with a fresh line id.
    #[must_use]
    pub fn from_product(product: &ProductDescriptor, quantity: u32) -> Self {
        Self {
            line_id: LineId::generate(),
            product_id: product.product_id.clone(),
            name: product.name.clone(),
            image_ref: product.image_ref.clone(),
            unit: product.unit.clone(),
            unit_price: product.unit_price,
            quantity,
        }
    }

    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Which transition a wishlist toggle performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WishlistState {
    Added,
    Removed,
}

/// Derived cart totals. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    /// Sum of line quantities (header badge count).
    pub item_count: u64,
    pub currency: CurrencyCode,
}

impl CartTotals {
    /// Compute totals over `lines`.
    ///
    /// Tax is rounded to two decimal places. The flat shipping fee only
    /// applies to a non-empty cart.
    #[must_use]
    pub fn compute(
        lines: &[CartLine],
        tax_rate: Decimal,
        shipping_fee: Decimal,
        currency: CurrencyCode,
    ) -> Self {
        let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
        let item_count = lines.iter().map(|line| u64::from(line.quantity)).sum();

        if lines.is_empty() {
            return Self {
                subtotal,
                tax: Decimal::ZERO,
                shipping: Decimal::ZERO,
                total: Decimal::ZERO,
                item_count,
                currency,
            };
        }

        let tax = (subtotal * tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

        Self {
            subtotal,
            tax,
            shipping: shipping_fee,
            total: subtotal + tax + shipping_fee,
            item_count,
            currency,
        }
    }

    /// The subtotal as a display price.
    #[must_use]
    pub const fn subtotal_price(&self) -> Price {
        Price::new(self.subtotal, self.currency)
    }

    /// The tax as a display price.
    #[must_use]
    pub const fn tax_price(&self) -> Price {
        Price::new(self.tax, self.currency)
    }

    /// The shipping fee as a display price.
    #[must_use]
    pub const fn shipping_price(&self) -> Price {
        Price::new(self.shipping, self.currency)
    }

    /// The grand total as a display price.
    #[must_use]
    pub const fn total_price(&self) -> Price {
        Price::new(self.total, self.currency)
    }
}
