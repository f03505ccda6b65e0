//! Core types for Tangogi.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod id;
pub mod price;
pub mod product;

pub use cart::{CartLine, CartTotals, WishlistState};
pub use id::{IdError, LineId, ProductId};
pub use price::{CurrencyCode, Price, UnknownCurrency};
pub use product::{ProductDescriptor, ProductError};
