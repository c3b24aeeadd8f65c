use std::sync::Arc;
use uuid::Uuid;

use super::aggregate::Order;
use super::commands::OrderPatch;
use super::errors::OrderError;
use super::value_objects::OrderItemRequest;
use crate::domain::inventory::{self, StockMovement, StockRequest, StockReservationValidator};
use crate::store::{rollback_with, Store, UnitOfWork};

// ============================================================================
// Order Mutation Processor
// ============================================================================
//
// update with items:
//   release old items → validate new items → reserve new items → replace
//
// The old stock is released first because the new set may reuse it. If the
// new set does not validate, the unit of work is rolled back, which restores
// the released stock and leaves the order's items untouched.
//
// Old and new products are locked together, ascending by id, before any
// stock moves.
//
// ============================================================================

/// Outcome of a successful update.
#[derive(Debug, Clone)]
pub struct UpdatedOrder {
    pub order: Order,
    pub released: Vec<StockMovement>,
    pub reserved: Vec<StockMovement>,
}

impl UpdatedOrder {
    pub fn items_replaced(&self) -> bool {
        !self.released.is_empty() || !self.reserved.is_empty()
    }
}

pub struct OrderMutationProcessor {
    store: Arc<dyn Store>,
    validator: StockReservationValidator,
}

impl OrderMutationProcessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            validator: StockReservationValidator::new(),
        }
    }

    pub async fn update(&self, order_id: Uuid, patch: OrderPatch) -> Result<UpdatedOrder, OrderError> {
        patch.validate()?;

        let mut tx = self.store.begin().await?;
        match self.update_in(tx.as_mut(), order_id, &patch).await {
            Ok(updated) => {
                tx.commit().await?;
                tracing::info!(
                    order_id = %updated.order.id,
                    version = updated.order.version,
                    items_replaced = updated.items_replaced(),
                    total_amount = updated.order.total_amount,
                    "✅ Order updated"
                );
                Ok(updated)
            }
            Err(e) => {
                let e = rollback_with(tx, e).await;
                if patch.items.is_some() {
                    tracing::warn!(
                        order_id = %order_id,
                        error = %e,
                        "Order update rolled back, previous items and stock kept"
                    );
                } else {
                    tracing::warn!(order_id = %order_id, error = %e, "Order update rejected");
                }
                Err(e)
            }
        }
    }

    async fn update_in(
        &self,
        tx: &mut dyn UnitOfWork,
        order_id: Uuid,
        patch: &OrderPatch,
    ) -> Result<UpdatedOrder, OrderError> {
        let mut order = tx.order_by_id(order_id).await?.ok_or(OrderError::OrderNotFound(order_id))?;

        let (released, reserved) = match &patch.items {
            Some(items) => self.replace_items(&mut *tx, &mut order, items).await?,
            None => (Vec::new(), Vec::new()),
        };

        order.apply_patch(patch);
        let order = tx.update_order(&order).await?;

        Ok(UpdatedOrder { order, released, reserved })
    }

    async fn replace_items(
        &self,
        tx: &mut dyn UnitOfWork,
        order: &mut Order,
        items: &[OrderItemRequest],
    ) -> Result<(Vec<StockMovement>, Vec<StockMovement>), OrderError> {
        let touched = order
            .items
            .iter()
            .map(|item| item.product_id)
            .chain(items.iter().map(|item| item.product_id));
        inventory::lock_products(&mut *tx, touched).await?;

        let released = inventory::release(&mut *tx, &order.items).await?;

        let resolved = self
            .validator
            .validate(&mut *tx, &StockRequest::from_items(items))
            .await?;
        let reserved = inventory::reserve(&mut *tx, resolved).await?;

        order.replace_items(items)?;
        Ok((released, reserved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::Product;
    use crate::domain::order::{NewOrder, OrderEntryProcessor, SalesChannel};
    use crate::store::InMemoryStore;

    struct Fixture {
        store: InMemoryStore,
        entry: OrderEntryProcessor,
        mutation: OrderMutationProcessor,
        p1: Product,
        p2: Product,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let p1 = store.insert_product(Product::new(Uuid::new_v4(), "P1", 100, 5)).await;
        let p2 = store.insert_product(Product::new(Uuid::new_v4(), "P2", 40, 10)).await;
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        Fixture {
            entry: OrderEntryProcessor::new(shared.clone()),
            mutation: OrderMutationProcessor::new(shared),
            store,
            p1,
            p2,
        }
    }

    impl Fixture {
        async fn stock(&self, id: Uuid) -> i32 {
            self.store.find_product(id).await.unwrap().unwrap().quantity
        }

        async fn place(&self, items: Vec<OrderItemRequest>) -> Order {
            self.entry
                .create(NewOrder::new(SalesChannel::Offline, "0901234567", items))
                .await
                .unwrap()
                .order
        }
    }

    #[tokio::test]
    async fn test_replacing_items_moves_stock_and_recomputes_total() {
        let f = fixture().await;
        let order = f.place(vec![OrderItemRequest::new(f.p1.id, 3, 100)]).await;

        let updated = f
            .mutation
            .update(order.id, OrderPatch::items(vec![OrderItemRequest::new(f.p2.id, 4, 40)]))
            .await
            .unwrap();

        assert_eq!(updated.order.total_amount, 160);
        assert!(updated.order.total_is_consistent());
        assert_eq!(updated.order.version, order.version + 1);
        assert_eq!(f.stock(f.p1.id).await, 5);
        assert_eq!(f.stock(f.p2.id).await, 6);
    }

    #[tokio::test]
    async fn test_new_items_may_reuse_released_capacity() {
        let f = fixture().await;
        let order = f.place(vec![OrderItemRequest::new(f.p1.id, 3, 100)]).await;
        assert_eq!(f.stock(f.p1.id).await, 2);

        // 5 only fits once the 3 held by this order are released.
        let updated = f
            .mutation
            .update(order.id, OrderPatch::items(vec![OrderItemRequest::new(f.p1.id, 5, 100)]))
            .await
            .unwrap();

        assert_eq!(updated.order.total_amount, 500);
        assert_eq!(f.stock(f.p1.id).await, 0);
    }

    #[tokio::test]
    async fn test_failed_replacement_restores_items_and_stock() {
        let f = fixture().await;
        let order = f
            .place(vec![OrderItemRequest::new(f.p1.id, 3, 100), OrderItemRequest::new(f.p2.id, 2, 40)])
            .await;

        let err = f
            .mutation
            .update(
                order.id,
                OrderPatch::items(vec![OrderItemRequest::new(f.p2.id, 1, 40), OrderItemRequest::new(f.p1.id, 10, 100)]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::InsufficientStock { requested: 10, available: 5, .. }));
        assert_eq!(f.stock(f.p1.id).await, 2);
        assert_eq!(f.stock(f.p2.id).await, 8);
        assert_eq!(f.store.find_order(order.id).await.unwrap().unwrap(), order);
    }

    #[tokio::test]
    async fn test_scalar_patch_keeps_items_and_stock() {
        let f = fixture().await;
        let order = f.place(vec![OrderItemRequest::new(f.p1.id, 1, 100)]).await;

        let patch = OrderPatch {
            status: Some("shipped".to_string()),
            shipping_address: Some("12 Harbour Rd".to_string()),
            ..OrderPatch::default()
        };
        let updated = f.mutation.update(order.id, patch).await.unwrap();

        assert!(!updated.items_replaced());
        assert_eq!(updated.order.status.as_deref(), Some("shipped"));
        assert_eq!(updated.order.shipping_address.as_deref(), Some("12 Harbour Rd"));
        assert_eq!(updated.order.phone, order.phone);
        assert_eq!(updated.order.items, order.items);
        assert_eq!(f.stock(f.p1.id).await, 4);
    }

    #[tokio::test]
    async fn test_unknown_order_is_reported() {
        let f = fixture().await;
        let missing = Uuid::new_v4();
        let err = f.mutation.update(missing, OrderPatch::default()).await.unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound(id) if id == missing));
    }
}
