use std::sync::Arc;

use super::aggregate::Order;
use super::commands::NewOrder;
use super::errors::OrderError;
use crate::domain::inventory::{self, StockMovement, StockRequest, StockReservationValidator};
use crate::store::{rollback_with, Store, UnitOfWork};

// ============================================================================
// Order Entry Processor
// ============================================================================
//
// create: shape check → validate all stock → reserve all stock → persist order
//
// Everything after the shape check runs in one unit of work. Any failure
// rolls it back, so neither stock nor a partial order is ever visible.
//
// ============================================================================

/// Outcome of a successful create.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub reserved: Vec<StockMovement>,
}

pub struct OrderEntryProcessor {
    store: Arc<dyn Store>,
    validator: StockReservationValidator,
}

impl OrderEntryProcessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            validator: StockReservationValidator::new(),
        }
    }

    pub async fn create(&self, command: NewOrder) -> Result<PlacedOrder, OrderError> {
        command.validate()?;
        let order = Order::place(command)?;

        let mut tx = self.store.begin().await?;
        match self.place_in(tx.as_mut(), order).await {
            Ok(placed) => {
                tx.commit().await?;
                tracing::info!(
                    order_id = %placed.order.id,
                    channel = %placed.order.channel,
                    item_count = placed.order.items.len(),
                    total_amount = placed.order.total_amount,
                    "✅ Order created"
                );
                Ok(placed)
            }
            Err(e) => {
                let e = rollback_with(tx, e).await;
                tracing::warn!(error = %e, "Order creation rejected");
                Err(e)
            }
        }
    }

    async fn place_in(&self, tx: &mut dyn UnitOfWork, order: Order) -> Result<PlacedOrder, OrderError> {
        let requests = StockRequest::from_items(&order.item_requests());
        let resolved = self.validator.validate(&mut *tx, &requests).await?;

        for stock in &resolved {
            for item in order.items.iter().filter(|item| item.product_id == stock.product.id) {
                if item.price != stock.product.price {
                    tracing::debug!(
                        product_id = %stock.product.id,
                        snapshot_price = item.price,
                        catalog_price = stock.product.price,
                        "Order line price differs from catalog price"
                    );
                }
            }
        }

        let reserved = inventory::reserve(&mut *tx, resolved).await?;
        let order = tx.create_order(&order).await?;

        Ok(PlacedOrder { order, reserved })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::Product;
    use crate::domain::order::{OrderItemRequest, SalesChannel};
    use crate::store::InMemoryStore;
    use uuid::Uuid;

    async fn setup(stock: &[(i64, i32)]) -> (InMemoryStore, OrderEntryProcessor, Vec<Product>) {
        let store = InMemoryStore::new();
        let mut products = Vec::new();
        for (index, (price, quantity)) in stock.iter().enumerate() {
            let product = Product::new(Uuid::new_v4(), format!("P{}", index + 1), *price, *quantity);
            products.push(store.insert_product(product).await);
        }
        let processor = OrderEntryProcessor::new(Arc::new(store.clone()));
        (store, processor, products)
    }

    async fn stock_of(store: &InMemoryStore, id: Uuid) -> i32 {
        store.find_product(id).await.unwrap().unwrap().quantity
    }

    #[tokio::test]
    async fn test_create_reserves_stock_and_computes_total() {
        let (store, processor, products) = setup(&[(100, 5), (50, 4)]).await;
        let command = NewOrder::new(
            SalesChannel::Shopee,
            "0901234567",
            vec![
                OrderItemRequest::new(products[0].id, 3, 100),
                OrderItemRequest::new(products[1].id, 2, 45),
            ],
        );

        let placed = processor.create(command).await.unwrap();

        assert_eq!(placed.order.total_amount, 390);
        assert!(placed.order.total_is_consistent());
        assert_eq!(inventory::total_units(&placed.reserved), 5);
        assert_eq!(stock_of(&store, products[0].id).await, 2);
        assert_eq!(stock_of(&store, products[1].id).await, 2);
        assert_eq!(store.find_order(placed.order.id).await.unwrap().unwrap(), placed.order);
    }

    #[tokio::test]
    async fn test_short_product_leaves_other_products_untouched() {
        let (store, processor, products) = setup(&[(100, 5), (50, 4)]).await;
        let command = NewOrder::new(
            SalesChannel::Offline,
            "0901234567",
            vec![
                OrderItemRequest::new(products[0].id, 1_000, 100),
                OrderItemRequest::new(products[1].id, 1, 50),
            ],
        );

        let err = processor.create(command).await.unwrap_err();

        assert!(matches!(err, OrderError::InsufficientStock { requested: 1_000, available: 5, .. }));
        assert_eq!(stock_of(&store, products[0].id).await, 5);
        assert_eq!(stock_of(&store, products[1].id).await, 4);
        assert!(store.recent_orders(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_product_later_in_the_list_rolls_back_earlier_ones() {
        let (store, processor, products) = setup(&[(100, 5), (50, 1)]).await;
        let command = NewOrder::new(
            SalesChannel::Tiktok,
            "0901234567",
            vec![
                OrderItemRequest::new(products[0].id, 2, 100),
                OrderItemRequest::new(products[1].id, 3, 50),
            ],
        );

        assert!(processor.create(command).await.is_err());
        assert_eq!(stock_of(&store, products[0].id).await, 5);
        assert_eq!(stock_of(&store, products[1].id).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_product_is_reported() {
        let (store, processor, products) = setup(&[(100, 5)]).await;
        let missing = Uuid::new_v4();
        let command = NewOrder::new(
            SalesChannel::Shopee,
            "0901234567",
            vec![OrderItemRequest::new(products[0].id, 1, 100), OrderItemRequest::new(missing, 1, 10)],
        );

        let err = processor.create(command).await.unwrap_err();

        assert!(matches!(err, OrderError::ProductNotFound(id) if id == missing));
        assert_eq!(stock_of(&store, products[0].id).await, 5);
    }

    #[tokio::test]
    async fn test_empty_items_rejected_before_any_store_access() {
        let (_store, processor, _) = setup(&[]).await;
        let err = processor
            .create(NewOrder::new(SalesChannel::Offline, "0901234567", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_price_snapshot_is_kept() {
        let (_store, processor, products) = setup(&[(100, 5)]).await;
        let placed = processor
            .create(NewOrder::new(
                SalesChannel::Offline,
                "0901234567",
                vec![OrderItemRequest::new(products[0].id, 2, 80)],
            ))
            .await
            .unwrap();

        assert_eq!(placed.order.items[0].price, 80);
        assert_eq!(placed.order.total_amount, 160);
    }
}
