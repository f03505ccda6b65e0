//! Store configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `TANGOGI_TAX_RATE` - Tax rate as a fraction (default: 0.05)
//! - `TANGOGI_SHIPPING_FEE` - Flat shipping fee per order (default: 500)
//! - `TANGOGI_MAX_QUANTITY` - Per-line quantity ceiling (default: 99)
//! - `TANGOGI_STORAGE_PREFIX` - Storage key prefix (default: `tangogi-`)
//! - `TANGOGI_CURRENCY` - ISO 4217 currency code (default: NGN)

use rust_decimal::Decimal;
use tangogi_core::CurrencyCode;
use thiserror::Error;

/// Logical key of the persisted cart.
pub const CART_KEY: &str = "cart";
/// Logical key of the persisted wishlist.
pub const WISHLIST_KEY: &str = "wishlist";

const DEFAULT_MAX_QUANTITY: u32 = 99;
const DEFAULT_STORAGE_PREFIX: &str = "tangogi-";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Process-wide cart settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Tax as a fraction of the subtotal
    pub tax_rate: Decimal,
    /// Flat fee added to every non-empty order
    pub shipping_fee: Decimal,
    /// Highest quantity a single line may hold
    pub max_quantity: u32,
    /// Prefix applied to every storage key
    pub storage_prefix: String,
    /// Currency for totals
    pub currency: CurrencyCode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(5, 2),
            shipping_fee: Decimal::from(500),
            max_quantity: DEFAULT_MAX_QUANTITY,
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            currency: CurrencyCode::NGN,
        }
    }
}

impl StoreConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed or is out
    /// of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let tax_rate = parse_or("TANGOGI_TAX_RATE", &lookup, defaults.tax_rate)?;
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
            return Err(invalid("TANGOGI_TAX_RATE", "must be between 0 and 1"));
        }

        let shipping_fee = parse_or("TANGOGI_SHIPPING_FEE", &lookup, defaults.shipping_fee)?;
        if shipping_fee < Decimal::ZERO {
            return Err(invalid("TANGOGI_SHIPPING_FEE", "must not be negative"));
        }

        let max_quantity = parse_or("TANGOGI_MAX_QUANTITY", &lookup, defaults.max_quantity)?;
        if max_quantity == 0 {
            return Err(invalid("TANGOGI_MAX_QUANTITY", "must be at least 1"));
        }

        let storage_prefix =
            lookup("TANGOGI_STORAGE_PREFIX").unwrap_or(defaults.storage_prefix);
        let currency = parse_or("TANGOGI_CURRENCY", &lookup, defaults.currency)?;

        Ok(Self {
            tax_rate,
            shipping_fee,
            max_quantity,
            storage_prefix,
            currency,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidEnvVar(key.to_string(), reason.to_string())
}

/// Parse a variable if it is set, otherwise use `default`.
fn parse_or<T>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}
