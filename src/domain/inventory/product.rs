use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::OrderError;

// ============================================================================
// Product - stock-relevant projection of a catalog product
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    /// Live catalog price. Order totals never read it.
    pub price: i64,
    pub quantity: i32,
    /// Version observed when this copy was read; writes are conditional on it.
    pub version: i64,
}

impl Product {
    pub fn new(id: Uuid, name: impl Into<String>, price: i64, quantity: i32) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            quantity,
            version: 0,
        }
    }

    /// Decrement stock. Never lets the quantity go negative.
    pub fn reserve(&mut self, amount: i32) -> Result<(), OrderError> {
        if amount > self.quantity {
            return Err(OrderError::InsufficientStock {
                product_id: self.id,
                product_name: self.name.clone(),
                requested: i64::from(amount),
                available: self.quantity,
            });
        }
        self.quantity -= amount;
        Ok(())
    }

    /// Increment stock by a previously reserved amount.
    pub fn release(&mut self, amount: i32) -> Result<(), OrderError> {
        self.quantity = self.quantity.checked_add(amount).ok_or_else(|| {
            OrderError::validation(format!("stock for product {} would overflow", self.id))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_release() {
        let mut product = Product::new(Uuid::new_v4(), "iPhone 15 Pro Max", 30_000_000, 5);

        product.reserve(3).unwrap();
        assert_eq!(product.quantity, 2);

        product.release(3).unwrap();
        assert_eq!(product.quantity, 5);
    }

    #[test]
    fn test_reserve_more_than_available_leaves_stock_untouched() {
        let mut product = Product::new(Uuid::new_v4(), "AirPods Pro", 450_000, 2);

        let err = product.reserve(3).unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock { requested: 3, available: 2, .. }));
        assert_eq!(product.quantity, 2);
    }

    #[test]
    fn test_release_overflow_is_rejected() {
        let mut product = Product::new(Uuid::new_v4(), "Cable", 10, i32::MAX);
        assert!(product.release(1).is_err());
        assert_eq!(product.quantity, i32::MAX);
    }
}
