use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    sort_newest_first, ChannelRollup, OrderRollups, OrderStore, ProductStockStore, StatusRollup, Store, StoreError,
    UnitOfWork,
};
use crate::domain::inventory::Product;
use crate::domain::order::{Order, OrderFilter, SalesChannel};
use crate::health::{ComponentHealth, HealthStatus};

// ============================================================================
// In-Memory Store - optimistic, versioned
// ============================================================================
//
// A unit of work buffers its writes and sees its own buffered state. Commit
// takes the write lock once, checks every touched row still carries the
// version observed when it was read, and applies everything or nothing.
// A unit of work that is dropped without commit leaves no trace.
//
// ============================================================================

#[derive(Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a catalog product. Catalog management lives outside
    /// the engine; this seeds stock for tests and the demo.
    pub async fn insert_product(&self, product: Product) -> Product {
        let mut state = self.state.write().await;
        state.products.insert(product.id, product.clone());
        product
    }
}

enum PendingOrder {
    Create(Order),
    Update { order: Order, expected_version: i64 },
    Delete { expected_version: i64 },
}

pub struct MemoryUnitOfWork {
    state: Arc<RwLock<MemoryState>>,
    /// Buffered product writes; `version` is still the version that was read.
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, PendingOrder>,
}

fn conflict(entity: &'static str, id: Uuid) -> StoreError {
    StoreError::Conflict { entity, id }
}

#[async_trait]
impl ProductStockStore for MemoryUnitOfWork {
    async fn product_by_id(&mut self, id: Uuid) -> Result<Option<Product>, StoreError> {
        if let Some(pending) = self.products.get(&id) {
            return Ok(Some(pending.clone()));
        }
        let state = self.state.read().await;
        Ok(state.products.get(&id).cloned())
    }

    async fn save_product(&mut self, product: &Product) -> Result<Product, StoreError> {
        if product.quantity < 0 {
            return Err(StoreError::Constraint(format!(
                "stock for product {} cannot be negative ({})",
                product.id, product.quantity
            )));
        }

        let observed = match self.products.get(&product.id) {
            Some(pending) => Some(pending.version),
            None => self.state.read().await.products.get(&product.id).map(|p| p.version),
        };
        if observed != Some(product.version) {
            return Err(conflict("product", product.id));
        }

        self.products.insert(product.id, product.clone());
        Ok(product.clone())
    }
}

#[async_trait]
impl OrderStore for MemoryUnitOfWork {
    async fn order_by_id(&mut self, id: Uuid) -> Result<Option<Order>, StoreError> {
        match self.orders.get(&id) {
            Some(PendingOrder::Create(order)) | Some(PendingOrder::Update { order, .. }) => Ok(Some(order.clone())),
            Some(PendingOrder::Delete { .. }) => Ok(None),
            None => Ok(self.state.read().await.orders.get(&id).cloned()),
        }
    }

    async fn create_order(&mut self, order: &Order) -> Result<Order, StoreError> {
        let exists = self.orders.contains_key(&order.id) || self.state.read().await.orders.contains_key(&order.id);
        if exists {
            return Err(StoreError::Constraint(format!("order {} already exists", order.id)));
        }
        self.orders.insert(order.id, PendingOrder::Create(order.clone()));
        Ok(order.clone())
    }

    async fn update_order(&mut self, order: &Order) -> Result<Order, StoreError> {
        let (saved, pending) = match self.orders.remove(&order.id) {
            Some(PendingOrder::Create(created)) if created.version == order.version => {
                (order.clone(), PendingOrder::Create(order.clone()))
            }
            Some(PendingOrder::Update { order: staged, expected_version }) if staged.version == order.version => {
                let mut next = order.clone();
                next.version = expected_version + 1;
                (next.clone(), PendingOrder::Update { order: next, expected_version })
            }
            Some(other) => {
                self.orders.insert(order.id, other);
                return Err(conflict("order", order.id));
            }
            None => {
                let current = self.state.read().await.orders.get(&order.id).map(|o| o.version);
                if current != Some(order.version) {
                    return Err(conflict("order", order.id));
                }
                let mut next = order.clone();
                next.version = order.version + 1;
                (next.clone(), PendingOrder::Update { order: next, expected_version: order.version })
            }
        };

        self.orders.insert(order.id, pending);
        Ok(saved)
    }

    async fn delete_order(&mut self, order: &Order) -> Result<(), StoreError> {
        match self.orders.remove(&order.id) {
            Some(PendingOrder::Create(_)) => Ok(()),
            Some(PendingOrder::Update { expected_version, .. }) => {
                self.orders.insert(order.id, PendingOrder::Delete { expected_version });
                Ok(())
            }
            Some(deleted @ PendingOrder::Delete { .. }) => {
                self.orders.insert(order.id, deleted);
                Err(conflict("order", order.id))
            }
            None => {
                let current = self.state.read().await.orders.get(&order.id).map(|o| o.version);
                if current != Some(order.version) {
                    return Err(conflict("order", order.id));
                }
                self.orders.insert(order.id, PendingOrder::Delete { expected_version: order.version });
                Ok(())
            }
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut state = this.state.write().await;

        // Validate everything before applying anything.
        for (id, product) in &this.products {
            if state.products.get(id).map(|p| p.version) != Some(product.version) {
                return Err(conflict("product", *id));
            }
        }
        for (id, pending) in &this.orders {
            let current = state.orders.get(id).map(|o| o.version);
            let ok = match pending {
                PendingOrder::Create(_) => current.is_none(),
                PendingOrder::Update { expected_version, .. } | PendingOrder::Delete { expected_version } => {
                    current == Some(*expected_version)
                }
            };
            if !ok {
                return Err(conflict("order", *id));
            }
        }

        for (id, mut product) in this.products {
            product.version += 1;
            state.products.insert(id, product);
        }
        for (id, pending) in this.orders {
            match pending {
                PendingOrder::Create(order) | PendingOrder::Update { order, .. } => {
                    state.orders.insert(id, order);
                }
                PendingOrder::Delete { .. } => {
                    state.orders.remove(&id);
                }
            }
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        tracing::debug!(
            products = self.products.len(),
            orders = self.orders.len(),
            "Discarding buffered writes"
        );
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork {
            state: self.state.clone(),
            products: HashMap::new(),
            orders: HashMap::new(),
        }))
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| filter.matches(o.channel, o.status.as_deref(), o.created_at))
            .cloned()
            .collect();
        sort_newest_first(&mut orders);
        Ok(orders)
    }

    async fn recent_orders(&self, limit: usize) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state.orders.values().cloned().collect();
        sort_newest_first(&mut orders);
        orders.truncate(limit);
        Ok(orders)
    }

    async fn order_rollups(&self) -> Result<OrderRollups, StoreError> {
        let state = self.state.read().await;

        let mut by_channel: BTreeMap<SalesChannel, (i64, i64)> = BTreeMap::new();
        let mut by_status: BTreeMap<Option<String>, i64> = BTreeMap::new();
        for order in state.orders.values() {
            let entry = by_channel.entry(order.channel).or_default();
            entry.0 += 1;
            entry.1 += order.total_amount;
            *by_status.entry(order.status.clone()).or_default() += 1;
        }

        Ok(OrderRollups {
            by_channel: by_channel
                .into_iter()
                .map(|(channel, (count, revenue))| ChannelRollup { channel, count, revenue })
                .collect(),
            by_status: by_status
                .into_iter()
                .map(|(status, count)| StatusRollup { status, count })
                .collect(),
        })
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn health_check(&self) -> ComponentHealth {
        let state = self.state.read().await;
        ComponentHealth::new("memory_store", HealthStatus::Healthy).with_details(format!(
            "{} products, {} orders",
            state.products.len(),
            state.orders.len()
        ))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
