use serde::{Deserialize, Serialize};

use crate::domain::types::{Money, ProductId, ProductScope};
use crate::error::{BookingError, Result};

/// How a product's price responds to quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PricingStrategy {
    /// First unit at one rate, every further unit at another
    InitialPlusAdditional { initial: Money, additional: Money },
    /// Flat price regardless of quantity
    OneTime { price: Money },
    /// Plain unit price times quantity
    SimpleStock { unit_price: Money },
}

impl PricingStrategy {
    pub fn price_for(&self, quantity: u32) -> Money {
        match self {
            PricingStrategy::InitialPlusAdditional {
                initial,
                additional,
            } => initial.add(additional.times(quantity.saturating_sub(1))),
            PricingStrategy::OneTime { price } => *price,
            PricingStrategy::SimpleStock { unit_price } => unit_price.times(quantity),
        }
    }
}

/// Bookable add-on offered alongside rooms
///
/// Name, strategy and stock are plain catalogue edits; the scope is fixed
/// at creation because counter keys and release records depend on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    scope: ProductScope,
    pub name: String,
    pub strategy: PricingStrategy,
    pub total_quantity: u32,
}

impl Product {
    pub fn new(
        scope: ProductScope,
        name: impl Into<String>,
        strategy: PricingStrategy,
        total_quantity: u32,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BookingError::Validation {
                field: "name".to_string(),
                message: "product name cannot be empty".to_string(),
            });
        }
        Ok(Self {
            id: ProductId::new(),
            scope,
            name,
            strategy,
            total_quantity,
        })
    }

    pub fn scope(&self) -> ProductScope {
        self.scope
    }

    /// Freezes the current strategy and name into a breakdown line.
    pub fn calculate_price(&self, quantity: u32) -> Result<ProductPriceBreakdown> {
        if quantity == 0 {
            return Err(BookingError::Validation {
                field: "quantity".to_string(),
                message: format!("quantity for product {} must be positive", self.id),
            });
        }
        Ok(ProductPriceBreakdown {
            product_id: self.id,
            product_name: self.name.clone(),
            scope: self.scope,
            quantity,
            strategy: self.strategy,
            total_price: self.strategy.price_for(quantity),
        })
    }
}

/// Immutable per-product line of a price snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPriceBreakdown {
    pub product_id: ProductId,
    pub product_name: String,
    pub scope: ProductScope,
    pub quantity: u32,
    pub strategy: PricingStrategy,
    pub total_price: Money,
}

impl ProductPriceBreakdown {
    /// Rebuilds a persisted line, re-checking that the stored total still
    /// matches what the frozen strategy yields for the stored quantity.
    pub fn restore(
        product_id: ProductId,
        product_name: impl Into<String>,
        scope: ProductScope,
        quantity: u32,
        strategy: PricingStrategy,
        total_price: Money,
    ) -> Result<Self> {
        let line = Self {
            product_id,
            product_name: product_name.into(),
            scope,
            quantity,
            strategy,
            total_price,
        };
        line.validate()?;
        Ok(line)
    }

    pub fn validate(&self) -> Result<()> {
        if self.quantity == 0 {
            return Err(BookingError::Validation {
                field: "quantity".to_string(),
                message: format!("quantity for product {} must be positive", self.product_id),
            });
        }
        let expected = self.strategy.price_for(self.quantity);
        if expected != self.total_price {
            return Err(BookingError::Validation {
                field: "total_price".to_string(),
                message: format!(
                    "stored total {} for product {} does not match strategy price {}",
                    self.total_price, self.product_id, expected
                ),
            });
        }
        Ok(())
    }
}
