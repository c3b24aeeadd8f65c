// ============================================================================
// Store Layer - Repository interfaces for products and orders
// ============================================================================
//
// The engine never touches a database directly. Processors receive an
// `Arc<dyn Store>` at construction and perform every create/update/remove
// inside one `UnitOfWork`:
//
//   begin() → reads/conditional writes via ProductStockStore + OrderStore
//           → commit() | rollback() (dropping the unit of work also rolls back)
//
// Backends:
// - memory   - buffered writes, version-checked commit (tests, demo)
// - postgres - sqlx transaction, row locks + version-conditional updates
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::inventory::Product;
use crate::domain::order::{Order, OrderFilter, SalesChannel};
use crate::health::ComponentHealth;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The row changed (or vanished) since it was read in this unit of work.
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: Uuid },

    /// The database aborted the transaction to break a deadlock or a
    /// serialization failure. Nothing was applied.
    #[error("Transaction aborted by concurrent access ({code}): {message}")]
    Contention { code: String, message: String },

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// SQLSTATE 40P01 (deadlock_detected) and 40001 (serialization_failure).
pub(crate) fn is_contention_code(code: &str) -> bool {
    matches!(code, "40P01" | "40001")
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if let Some(code) = db.code().filter(|code| is_contention_code(code)) {
                return StoreError::Contention {
                    code: code.into_owned(),
                    message: db.message().to_string(),
                };
            }
        }
        StoreError::Database(err)
    }
}

/// Product stock reads and conditional writes, scoped to a unit of work.
///
/// Backends may lock the row on read until the unit of work ends. Callers
/// touching several products read them in ascending id order (see
/// `inventory::lock_products`) so two units of work never wait on each other
/// in a cycle.
#[async_trait]
pub trait ProductStockStore: Send {
    async fn product_by_id(&mut self, id: Uuid) -> Result<Option<Product>, StoreError>;

    /// Persist `product.quantity`, conditional on `product.version` still being
    /// the stored version. Fails with `Conflict` otherwise.
    async fn save_product(&mut self, product: &Product) -> Result<Product, StoreError>;
}

/// Order aggregate persistence, scoped to a unit of work.
#[async_trait]
pub trait OrderStore: Send {
    async fn order_by_id(&mut self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn create_order(&mut self, order: &Order) -> Result<Order, StoreError>;

    /// Replace header and items, conditional on `order.version`.
    async fn update_order(&mut self, order: &Order) -> Result<Order, StoreError>;

    /// Delete order and items, conditional on `order.version`.
    async fn delete_order(&mut self, order: &Order) -> Result<(), StoreError>;
}

/// One transaction spanning both stores.
#[async_trait]
pub trait UnitOfWork: ProductStockStore + OrderStore {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRollup {
    pub channel: SalesChannel,
    pub count: i64,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusRollup {
    pub status: Option<String>,
    pub count: i64,
}

/// Grouped counts read from a single committed snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderRollups {
    pub by_channel: Vec<ChannelRollup>,
    pub by_status: Vec<StatusRollup>,
}

/// Entry point to a backend: opens units of work and serves committed reads.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    /// The `limit` most recently created orders, newest first.
    async fn recent_orders(&self, limit: usize) -> Result<Vec<Order>, StoreError>;

    async fn order_rollups(&self) -> Result<OrderRollups, StoreError>;

    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    async fn health_check(&self) -> ComponentHealth;
}

/// Roll back `tx` and hand back the error that caused it.
pub async fn rollback_with<E: std::fmt::Display>(tx: Box<dyn UnitOfWork>, error: E) -> E {
    if let Err(rollback_error) = tx.rollback().await {
        tracing::error!(
            error = %error,
            rollback_error = %rollback_error,
            "Rollback failed; relying on transaction drop to discard changes"
        );
    }
    error
}

/// Newest first, id as tie-breaker (v7 ids are time ordered).
pub(crate) fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlock_and_serialization_codes_are_contention() {
        assert!(is_contention_code("40P01"));
        assert!(is_contention_code("40001"));
        assert!(!is_contention_code("23505"));
        assert!(!is_contention_code("57014"));
    }

    #[test]
    fn test_non_database_errors_stay_database_errors() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Database(sqlx::Error::PoolTimedOut)));
    }
}
