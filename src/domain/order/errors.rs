use uuid::Uuid;

use crate::store::StoreError;

// ============================================================================
// Order & Stock Errors
// ============================================================================
//
// Raised synchronously by the processor that detects them and returned to
// the caller unchanged. Nothing here is retried internally.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Insufficient stock for product {product_name} ({product_id}): requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        product_name: String,
        requested: i64,
        available: i32,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Concurrent modification detected: {0}")]
    ConcurrentModification(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl OrderError {
    pub fn validation(message: impl Into<String>) -> Self {
        OrderError::Validation(message.into())
    }

    /// Stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::ConcurrentModification(_) => "concurrent_modification",
            OrderError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            conflict @ (StoreError::Conflict { .. } | StoreError::Contention { .. }) => {
                OrderError::ConcurrentModification(conflict.to_string())
            }
            other => OrderError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_concurrent_modification() {
        let id = Uuid::new_v4();
        let err: OrderError = StoreError::Conflict { entity: "product", id }.into();
        assert!(matches!(err, OrderError::ConcurrentModification(ref msg) if msg.contains(&id.to_string())));
        assert_eq!(err.kind(), "concurrent_modification");
    }

    #[test]
    fn test_deadlock_maps_to_concurrent_modification() {
        let err: OrderError = StoreError::Contention {
            code: "40P01".to_string(),
            message: "deadlock detected".to_string(),
        }
        .into();
        assert!(matches!(err, OrderError::ConcurrentModification(ref msg) if msg.contains("40P01")));
    }

    #[test]
    fn test_insufficient_stock_message_names_product_and_quantities() {
        let id = Uuid::new_v4();
        let err = OrderError::InsufficientStock {
            product_id: id,
            product_name: "AirPods Pro".to_string(),
            requested: 10,
            available: 2,
        };
        let message = err.to_string();
        assert!(message.contains("AirPods Pro"));
        assert!(message.contains("requested 10"));
        assert!(message.contains("available 2"));
    }
}
