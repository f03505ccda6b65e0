//! Tangogi Core - Shared types library.
//!
//! This crate provides the value types used across all Tangogi components:
//! - `cart` - The cart/wishlist state store
//! - `cli` - Command-line driver for a store persisted on disk
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! storage access, no listeners. This keeps it lightweight and allows it to
//! be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, prices, product descriptors, cart lines and totals

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
