//! Product catalog loaded from YAML.
//!
//! The store does no lookups of its own; the CLI resolves product ids here
//! and hands the store a full descriptor.

use std::path::Path;

use serde::Deserialize;
use tangogi_core::{ProductDescriptor, ProductError, ProductId};
use thiserror::Error;

/// Built-in demo catalog.
const DEFAULT_CATALOG: &str = include_str!("../catalog.yaml");

/// Catalog loading and lookup errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid catalog entry: {0}")]
    Invalid(#[from] ProductError),
    #[error("duplicate product id in catalog: {0}")]
    Duplicate(ProductId),
    #[error("unknown product: {0}")]
    UnknownProduct(String),
}

/// A list of products.
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    products: Vec<CatalogEntry>,
}

/// A product plus its listing category.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// Category slug ("fresh-produce", "meat"); empty when uncategorised.
    #[serde(default)]
    pub category: String,
    #[serde(flatten)]
    pub product: ProductDescriptor,
}

impl Catalog {
    /// The demo catalog shipped with the binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded file is malformed.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::parse(DEFAULT_CATALOG)
    }

    /// Load a catalog file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub async fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| CatalogError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
        Self::parse(&content)
    }

    /// Parse and validate catalog YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed, an entry is invalid, or a
    /// product id appears twice.
    pub fn parse(yaml: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_yaml::from_str(yaml)?;

        for (index, entry) in catalog.products.iter().enumerate() {
            let product = &entry.product;
            product.validate()?;
            if catalog
                .products
                .iter()
                .take(index)
                .any(|other| other.product.product_id == product.product_id)
            {
                return Err(CatalogError::Duplicate(product.product_id.clone()));
            }
        }

        Ok(catalog)
    }

    /// All entries in catalog order.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.products
    }

    /// Entries in `category`, compared case-insensitively, in catalog order.
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a CatalogEntry> {
        self.products
            .iter()
            .filter(move |entry| entry.category.eq_ignore_ascii_case(category))
    }

    /// Distinct categories in order of first appearance.
    #[must_use]
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for entry in &self.products {
            if !entry.category.is_empty() && !categories.contains(&entry.category.as_str()) {
                categories.push(&entry.category);
            }
        }
        categories
    }

    /// Look a product up by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownProduct`] if no product has that id.
    pub fn get(&self, product_id: &str) -> Result<&ProductDescriptor, CatalogError> {
        self.products
            .iter()
            .map(|entry| &entry.product)
            .find(|product| product.product_id.as_str() == product_id)
            .ok_or_else(|| CatalogError::UnknownProduct(product_id.to_string()))
    }
}
