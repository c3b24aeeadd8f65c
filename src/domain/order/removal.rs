use std::sync::Arc;
use uuid::Uuid;

use super::aggregate::Order;
use super::errors::OrderError;
use crate::domain::inventory::{self, StockMovement};
use crate::store::{rollback_with, Store, UnitOfWork};

// ============================================================================
// Order Removal Processor
// ============================================================================
//
// remove: load order → release every item's stock → delete order
//
// Release and delete commit together. The delete is conditional on the order
// version that was loaded, so two concurrent removals cannot both release.
//
// ============================================================================

/// Outcome of a successful remove.
#[derive(Debug, Clone)]
pub struct RemovedOrder {
    pub order: Order,
    pub released: Vec<StockMovement>,
}

pub struct OrderRemovalProcessor {
    store: Arc<dyn Store>,
}

impl OrderRemovalProcessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn remove(&self, order_id: Uuid) -> Result<RemovedOrder, OrderError> {
        let mut tx = self.store.begin().await?;
        match Self::remove_in(tx.as_mut(), order_id).await {
            Ok(removed) => {
                tx.commit().await?;
                tracing::info!(
                    order_id = %order_id,
                    item_count = removed.order.items.len(),
                    released_units = inventory::total_units(&removed.released),
                    "✅ Order removed"
                );
                Ok(removed)
            }
            Err(e) => {
                let e = rollback_with(tx, e).await;
                tracing::warn!(order_id = %order_id, error = %e, "Order removal rejected");
                Err(e)
            }
        }
    }

    async fn remove_in(tx: &mut dyn UnitOfWork, order_id: Uuid) -> Result<RemovedOrder, OrderError> {
        let order = tx.order_by_id(order_id).await?.ok_or(OrderError::OrderNotFound(order_id))?;

        let released = inventory::release(&mut *tx, &order.items).await?;
        tx.delete_order(&order).await?;

        Ok(RemovedOrder { order, released })
    }
}
