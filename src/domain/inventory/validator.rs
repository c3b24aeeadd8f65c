use uuid::Uuid;

use super::product::Product;
use crate::domain::order::{OrderError, OrderItemRequest};
use crate::store::ProductStockStore;

// ============================================================================
// Stock Reservation Validator
// ============================================================================
//
// All-or-nothing check over a set of stock requests. Only reads products;
// the caller reserves stock after every request has been confirmed, so a
// failure on a later product can never leave an earlier reservation applied.
//
// ============================================================================

/// Quantity wanted from one product, summed over every line that names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockRequest {
    pub product_id: Uuid,
    pub quantity: i64,
}

impl StockRequest {
    /// Merge line items per product, ascending by product id so product rows
    /// are always locked in the same order.
    pub fn from_items(items: &[OrderItemRequest]) -> Vec<StockRequest> {
        let mut requests: Vec<StockRequest> = Vec::with_capacity(items.len());
        for item in items {
            match requests.iter_mut().find(|r| r.product_id == item.product_id) {
                Some(existing) => existing.quantity += i64::from(item.quantity),
                None => requests.push(StockRequest {
                    product_id: item.product_id,
                    quantity: i64::from(item.quantity),
                }),
            }
        }
        requests.sort_by_key(|r| r.product_id);
        requests
    }
}

/// A product confirmed to have enough stock for `requested` units.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStock {
    pub product: Product,
    pub requested: i32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StockReservationValidator;

impl StockReservationValidator {
    pub fn new() -> Self {
        Self
    }

    pub async fn validate<S>(&self, store: &mut S, requests: &[StockRequest]) -> Result<Vec<ResolvedStock>, OrderError>
    where
        S: ProductStockStore + ?Sized,
    {
        let mut resolved = Vec::with_capacity(requests.len());

        for request in requests {
            let product = store
                .product_by_id(request.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(request.product_id))?;

            let requested = match i32::try_from(request.quantity) {
                Ok(requested) if requested <= product.quantity => requested,
                _ => {
                    tracing::warn!(
                        product_id = %product.id,
                        requested = request.quantity,
                        available = product.quantity,
                        "Stock validation failed"
                    );
                    return Err(OrderError::InsufficientStock {
                        product_id: product.id,
                        product_name: product.name,
                        requested: request.quantity,
                        available: product.quantity,
                    });
                }
            };

            resolved.push(ResolvedStock { product, requested });
        }

        Ok(resolved)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
