//! Tangogi Cart - client cart and wishlist state store.
//!
//! A [`CartStore`] holds the authoritative cart and wishlist for one tab,
//! persists them to a per-origin key-value storage after every mutation,
//! notifies subscribed views, and replaces its state wholesale when another
//! tab writes the same keys.
//!
//! # Example
//!
//! ```
//! use rust_decimal::Decimal;
//! use tangogi_cart::{CartStore, StoreConfig, storage::MemoryStorage};
//! use tangogi_core::{ProductDescriptor, ProductId};
//!
//! let tomatoes = ProductDescriptor {
//!     product_id: ProductId::parse("prod-001").unwrap(),
//!     unit_price: Decimal::from(1200),
//!     name: "Fresh Tomatoes".to_string(),
//!     image_ref: "images/products/tomatoes.jpg".to_string(),
//!     unit: "kg".to_string(),
//!     in_stock: true,
//! };
//!
//! let mut store = CartStore::open(MemoryStorage::new(), StoreConfig::default()).into_value();
//! let _ = store.add_to_cart(&tomatoes, 2).unwrap();
//!
//! assert_eq!(store.compute_totals().total, Decimal::from(3020));
//! ```
//!
//! # Modules
//!
//! - [`store`] - The state store and cross-tab reconciliation
//! - [`persistence`] - JSON load/save and the external change feed
//! - [`storage`] - Key-value backends (in-memory origin, directory)
//! - [`events`] - Change events, advisories, subscriptions
//! - [`config`] - Tax, shipping, quantity ceiling, key prefix

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod events;
pub mod persistence;
pub mod storage;
pub mod store;

pub use config::{ConfigError, StoreConfig};
pub use events::{Advisory, ChangeEvent, ChangeOrigin, Severity, Subscription};
pub use persistence::{ExternalChanges, Loaded, Persistence};
pub use store::{Applied, CartStore, Collection, QuantityChange, Rejection, SyncState};
