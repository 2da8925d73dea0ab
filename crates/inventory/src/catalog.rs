use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;
use domain::{Money, ProductStatus};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result};

/// A catalog product with its current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub brand_name: String,
    pub price: Money,
    pub inventory: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub brand_name: String,
    pub price: Money,
    pub inventory: i64,
}

impl NewProduct {
    /// Checks the fields a product must satisfy before it is stored.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::InvalidProduct("name must not be empty".into()));
        }
        if self.price.minor() < 0 {
            return Err(LedgerError::InvalidProduct(
                "price must not be negative".into(),
            ));
        }
        if self.inventory < 0 {
            return Err(LedgerError::InvalidProduct(
                "inventory must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Product catalog operations shared by the ledger implementations.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Stores a new product and returns it with its assigned id.
    async fn create_product(&self, product: NewProduct) -> Result<Product>;

    /// Returns a product by id.
    async fn get_product(&self, id: ProductId) -> Result<Product>;

    /// Returns all products ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Returns one status per requested id, in request order.
    async fn check_products(&self, ids: &[ProductId]) -> Result<Vec<ProductStatus>>;
}

pub(crate) fn missing(product_id: ProductId) -> ProductStatus {
    ProductStatus {
        product_id,
        price: Money::zero(),
        exists: false,
    }
}
