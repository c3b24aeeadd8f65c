use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::aggregate::Order;
use super::commands::{NewOrder, OrderFilter, OrderPatch};
use super::entry::OrderEntryProcessor;
use super::errors::OrderError;
use super::mutation::OrderMutationProcessor;
use super::removal::OrderRemovalProcessor;
use super::statistics::{OrderStatistics, StatisticsAggregator};
use crate::domain::inventory;
use crate::metrics::{operation, Metrics};
use crate::store::Store;

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Caller-facing entry point: routes each call to its processor and records
// the outcome. Errors are returned exactly as the processor raised them.
//
// ============================================================================

pub struct OrderCommandHandler {
    store: Arc<dyn Store>,
    entry: OrderEntryProcessor,
    mutation: OrderMutationProcessor,
    removal: OrderRemovalProcessor,
    statistics: StatisticsAggregator,
    metrics: Arc<Metrics>,
    recent_orders_limit: usize,
}

impl OrderCommandHandler {
    pub fn new(store: Arc<dyn Store>, metrics: Arc<Metrics>, recent_orders_limit: usize) -> Self {
        Self {
            entry: OrderEntryProcessor::new(store.clone()),
            mutation: OrderMutationProcessor::new(store.clone()),
            removal: OrderRemovalProcessor::new(store.clone()),
            statistics: StatisticsAggregator::new(store.clone()),
            store,
            metrics,
            recent_orders_limit,
        }
    }

    pub async fn create_order(&self, command: NewOrder) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.entry.create(command).await;
        self.metrics.record_duration(operation::CREATE, started.elapsed().as_secs_f64());

        match result {
            Ok(placed) => {
                self.metrics.record_order_created(placed.order.channel);
                self.metrics.record_stock_movement(inventory::total_units(&placed.reserved), 0);
                Ok(placed.order)
            }
            Err(e) => {
                self.metrics.record_failure(operation::CREATE, &e);
                Err(e)
            }
        }
    }

    pub async fn update_order(&self, order_id: Uuid, patch: OrderPatch) -> Result<Order, OrderError> {
        let replaces_items = patch.items.is_some();
        let started = Instant::now();
        let result = self.mutation.update(order_id, patch).await;
        self.metrics.record_duration(operation::UPDATE, started.elapsed().as_secs_f64());

        match result {
            Ok(updated) => {
                self.metrics.record_stock_movement(
                    inventory::total_units(&updated.reserved),
                    inventory::total_units(&updated.released),
                );
                Ok(updated.order)
            }
            Err(e) => {
                if replaces_items && rejects_new_items(&e) {
                    self.metrics.record_update_rollback();
                }
                self.metrics.record_failure(operation::UPDATE, &e);
                Err(e)
            }
        }
    }

    pub async fn remove_order(&self, order_id: Uuid) -> Result<(), OrderError> {
        let started = Instant::now();
        let result = self.removal.remove(order_id).await;
        self.metrics.record_duration(operation::REMOVE, started.elapsed().as_secs_f64());

        match result {
            Ok(removed) => {
                self.metrics.record_stock_movement(0, inventory::total_units(&removed.released));
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure(operation::REMOVE, &e);
                Err(e)
            }
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.list_orders(filter).await?)
    }

    pub async fn get_statistics(&self) -> Result<OrderStatistics, OrderError> {
        let started = Instant::now();
        let result = self.statistics.get_statistics().await;
        self.metrics.record_duration(operation::STATISTICS, started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            self.metrics.record_failure(operation::STATISTICS, e);
        }
        result
    }

    /// Most recent orders; `None` uses the configured default limit.
    pub async fn get_recent_orders(&self, limit: Option<usize>) -> Result<Vec<Order>, OrderError> {
        self.statistics.get_recent(limit.unwrap_or(self.recent_orders_limit)).await
    }
}

/// The new item set failed stock validation after the old stock was released,
/// so the rollback handed that stock back.
fn rejects_new_items(error: &OrderError) -> bool {
    matches!(error, OrderError::ProductNotFound(_) | OrderError::InsufficientStock { .. })
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inventory::Product;
    use crate::domain::order::{OrderItemRequest, SalesChannel};
    use crate::store::InMemoryStore;
    use proptest::prelude::*;
    use tokio::task::JoinSet;

    fn handler(store: &InMemoryStore) -> (OrderCommandHandler, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        (OrderCommandHandler::new(Arc::new(store.clone()), metrics.clone(), 10), metrics)
    }

    async fn stock(store: &InMemoryStore, id: Uuid) -> i32 {
        store.find_product(id).await.unwrap().unwrap().quantity
    }

    #[tokio::test]
    async fn test_order_lifecycle_keeps_stock_consistent() {
        let store = InMemoryStore::new();
        let p1 = store.insert_product(Product::new(Uuid::new_v4(), "P1", 100, 5)).await;
        let (handler, metrics) = handler(&store);

        let order = handler
            .create_order(NewOrder::new(
                SalesChannel::Offline,
                "0901234567",
                vec![OrderItemRequest::new(p1.id, 3, 100)],
            ))
            .await
            .unwrap();
        assert_eq!(order.total_amount, 300);
        assert_eq!(stock(&store, p1.id).await, 2);

        let err = handler
            .update_order(order.id, OrderPatch::items(vec![OrderItemRequest::new(p1.id, 10, 100)]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock { .. }));
        assert_eq!(stock(&store, p1.id).await, 2);

        let current = handler.get_order(order.id).await.unwrap();
        assert_eq!(current.items.len(), 1);
        assert_eq!(current.items[0].product_id, p1.id);
        assert_eq!(current.items[0].quantity, 3);

        handler.remove_order(order.id).await.unwrap();
        assert_eq!(stock(&store, p1.id).await, 5);
        assert!(matches!(
            handler.get_order(order.id).await,
            Err(OrderError::OrderNotFound(id)) if id == order.id
        ));

        assert_eq!(metrics.update_rollbacks.get(), 1);
        assert_eq!(metrics.stock_units_reserved.get(), 3);
        assert_eq!(metrics.stock_units_released.get(), 3);
    }

    #[tokio::test]
    async fn test_only_stock_rejections_count_as_update_rollbacks() {
        let store = InMemoryStore::new();
        let p1 = store.insert_product(Product::new(Uuid::new_v4(), "P1", 100, 5)).await;
        let (handler, metrics) = handler(&store);
        let one_unit = || OrderItemRequest::new(p1.id, 1, 100);

        let err = handler
            .update_order(Uuid::new_v4(), OrderPatch::items(vec![one_unit()]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound(_)));

        let order = handler
            .create_order(NewOrder::new(SalesChannel::Offline, "0901234567", vec![one_unit()]))
            .await
            .unwrap();
        let err = handler
            .update_order(order.id, OrderPatch::items(vec![OrderItemRequest::new(Uuid::new_v4(), 1, 100)]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ProductNotFound(_)));

        assert_eq!(metrics.update_rollbacks.get(), 1);
        assert!(!rejects_new_items(&OrderError::ConcurrentModification("order".to_string())));
        assert_eq!(stock(&store, p1.id).await, 4);
    }

    #[tokio::test]
    async fn test_list_and_recent_orders() {
        let store = InMemoryStore::new();
        let p1 = store.insert_product(Product::new(Uuid::new_v4(), "P1", 100, 100)).await;
        let (handler, _) = handler(&store);

        for channel in [SalesChannel::Shopee, SalesChannel::Offline, SalesChannel::Shopee] {
            handler
                .create_order(
                    NewOrder::new(channel, "0901234567", vec![OrderItemRequest::new(p1.id, 1, 100)])
                        .with_status("pending"),
                )
                .await
                .unwrap();
        }

        let shopee = handler
            .list_orders(&OrderFilter {
                channel: Some(SalesChannel::Shopee),
                ..OrderFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(shopee.len(), 2);
        assert!(shopee[0].created_at >= shopee[1].created_at);

        assert_eq!(handler.get_recent_orders(None).await.unwrap().len(), 3);
        assert_eq!(handler.get_recent_orders(Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_never_oversell() {
        let store = InMemoryStore::new();
        let p1 = store.insert_product(Product::new(Uuid::new_v4(), "P1", 100, 10)).await;
        let (handler, _) = handler(&store);
        let handler = Arc::new(handler);

        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let handler = handler.clone();
            tasks.spawn(async move {
                handler
                    .create_order(NewOrder::new(
                        SalesChannel::Tiktok,
                        "0901234567",
                        vec![OrderItemRequest::new(p1.id, 3, 100)],
                    ))
                    .await
            });
        }

        let mut placed = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => placed += 1,
                Err(OrderError::InsufficientStock { .. } | OrderError::ConcurrentModification(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        let remaining = stock(&store, p1.id).await;
        assert!(placed <= 3);
        assert_eq!(remaining, 10 - 3 * placed);
        assert_eq!(handler.get_statistics().await.unwrap().total_orders, i64::from(placed));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(i32),
        Update(usize, i32),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1..8i32).prop_map(Op::Create),
            (0..8usize, 1..8i32).prop_map(|(i, q)| Op::Update(i, q)),
            (0..8usize).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_stock_is_conserved(initial in 0..20i32, ops in prop::collection::vec(op(), 1..25)) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let store = InMemoryStore::new();
                let p1 = store.insert_product(Product::new(Uuid::new_v4(), "P1", 100, initial)).await;
                let (handler, metrics) = handler(&store);
                let mut live: Vec<Uuid> = Vec::new();

                for op in ops {
                    match op {
                        Op::Create(quantity) => {
                            let command = NewOrder::new(
                                SalesChannel::Offline,
                                "0901234567",
                                vec![OrderItemRequest::new(p1.id, quantity, 100)],
                            );
                            if let Ok(order) = handler.create_order(command).await {
                                live.push(order.id);
                            }
                        }
                        Op::Update(index, quantity) if !live.is_empty() => {
                            let id = live[index % live.len()];
                            let patch = OrderPatch::items(vec![OrderItemRequest::new(p1.id, quantity, 100)]);
                            if let Ok(order) = handler.update_order(id, patch).await {
                                assert!(order.total_is_consistent());
                            }
                        }
                        Op::Remove(index) if !live.is_empty() => {
                            let id = live.remove(index % live.len());
                            handler.remove_order(id).await.unwrap();
                        }
                        _ => {}
                    }

                    let current = stock(&store, p1.id).await;
                    let reserved = metrics.stock_units_reserved.get() as i64;
                    let released = metrics.stock_units_released.get() as i64;
                    assert!(current >= 0);
                    assert_eq!(i64::from(initial) - reserved + released, i64::from(current));
                }

                let held: i32 = handler
                    .list_orders(&OrderFilter::default())
                    .await
                    .unwrap()
                    .iter()
                    .flat_map(|order| order.items.iter().map(|item| item.quantity))
                    .sum();
                assert_eq!(stock(&store, p1.id).await + held, initial);
            });
        }
    }
}
