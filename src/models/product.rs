//! Product entity.

use super::require_text;
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};

/// A stored product. `sku` is unique; `name` is indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub sku: String,
    pub description: Option<String>,
    pub inventory: i64,
}

impl Product {
    /// Value of the stock on hand.
    pub fn inventory_value(&self) -> f64 {
        self.price * self.inventory as f64
    }
}

/// Fields for inserting a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    pub sku: String,
    pub description: Option<String>,
    #[serde(default)]
    pub inventory: i64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: f64, sku: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price,
            sku: sku.into(),
            description: None,
            inventory: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_inventory(mut self, inventory: i64) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn validate(&self) -> DbResult<()> {
        require_text("product name", &self.name, None)?;
        require_text("product sku", &self.sku, None)?;
        validate_price(self.price)?;
        validate_inventory(self.inventory)
    }
}

pub(crate) fn validate_price(price: f64) -> DbResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(DbError::invalid_input(format!(
            "product price must be a non-negative number, got {price}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_inventory(inventory: i64) -> DbResult<()> {
    if inventory < 0 {
        return Err(DbError::invalid_input(format!(
            "product inventory must be >= 0, got {inventory}"
        )));
    }
    Ok(())
}
