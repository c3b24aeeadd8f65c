use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::{
    ChannelRollup, OrderRollups, OrderStore, ProductStockStore, StatusRollup, Store, StoreError, UnitOfWork,
};
use crate::config::DatabaseConfig;
use crate::domain::inventory::Product;
use crate::domain::order::{Order, OrderFilter, OrderItem, SalesChannel};
use crate::health::{ComponentHealth, HealthStatus};
use crate::utils::{retry_on_transient, IsTransient, RetryConfig};

// ============================================================================
// Postgres Store
// ============================================================================
//
// Every unit of work is one database transaction:
// - product and order rows are read with SELECT ... FOR UPDATE
// - writes are conditional on the version that was read
//   (UPDATE ... WHERE id = $1 AND version = $2), zero rows = conflict
// - dropping the transaction without commit rolls it back
//
// ============================================================================

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS products (
        id UUID PRIMARY KEY,
        name VARCHAR(200) NOT NULL,
        price BIGINT NOT NULL,
        quantity INT NOT NULL DEFAULT 0 CHECK (quantity >= 0),
        version BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        version BIGINT NOT NULL DEFAULT 0,
        channel TEXT NOT NULL CHECK (channel IN ('offline', 'shopee', 'tiktok')),
        customer_name VARCHAR(150),
        phone VARCHAR(20) NOT NULL,
        email VARCHAR(150),
        shipping_address TEXT,
        status VARCHAR(50),
        total_amount BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS order_items (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
        product_id UUID NOT NULL REFERENCES products(id) ON DELETE RESTRICT,
        position INT NOT NULL,
        quantity INT NOT NULL CHECK (quantity >= 1),
        price BIGINT NOT NULL CHECK (price >= 0)
    )",
    "CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_order_items_order_id ON order_items (order_id)",
];

const ORDER_COLUMNS: &str =
    "id, version, channel, customer_name, phone, email, shipping_address, status, total_amount, created_at";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    max_connections: u32,
}

impl PostgresStore {
    /// Build a pool with the statement timeout applied to every connection.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let statement_timeout = format!("SET statement_timeout = {}", config.statement_timeout_ms);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .after_connect(move |conn, _meta| {
                let statement_timeout = statement_timeout.clone();
                Box::pin(async move {
                    sqlx::query(&statement_timeout).execute(conn).await?;
                    Ok(())
                })
            })
            .connect(&config.url)
            .await?;

        Ok(Self {
            pool,
            max_connections: config.max_connections,
        })
    }

    /// `connect`, retried while the database is unreachable.
    pub async fn connect_with_retry(config: &DatabaseConfig, retry: RetryConfig) -> Result<Self, sqlx::Error> {
        retry_on_transient(retry, |attempt| {
            tracing::info!(attempt, "Connecting to Postgres...");
            Self::connect(config)
        })
        .await
        .into_result()
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Database schema ready");
        Ok(())
    }

    /// Insert or replace a catalog product (demo seeding).
    pub async fn upsert_product(&self, product: &Product) -> Result<Product, StoreError> {
        let row = sqlx::query(
            "INSERT INTO products (id, name, price, quantity, version)
             VALUES ($1, $2, $3, $4, 0)
             ON CONFLICT (id) DO UPDATE
             SET name = EXCLUDED.name, price = EXCLUDED.price, quantity = EXCLUDED.quantity,
                 version = products.version + 1, updated_at = NOW()
             RETURNING id, name, price, quantity, version",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.quantity)
        .fetch_one(&self.pool)
        .await?;

        product_from_row(&row)
    }

    /// Read-only transaction over one committed snapshot; every query run on
    /// it sees the same state.
    async fn begin_snapshot(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn load_orders<'e, E>(executor: E, rows: Vec<PgRow>) -> Result<Vec<Order>, StoreError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let mut orders = rows.iter().map(order_header_from_row).collect::<Result<Vec<_>, _>>()?;
        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let item_rows = sqlx::query(
            "SELECT id, order_id, product_id, quantity, price
             FROM order_items
             WHERE order_id = ANY($1)
             ORDER BY order_id, position",
        )
        .bind(&ids)
        .fetch_all(executor)
        .await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items_by_order.entry(order_id).or_default().push(item_from_row(row)?);
        }
        for order in &mut orders {
            order.items = items_by_order.remove(&order.id).unwrap_or_default();
        }

        Ok(orders)
    }
}

/// Dynamic listing query; bounds are inclusive, newest first.
fn list_orders_query(filter: &OrderFilter) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"));

    if let Some(channel) = filter.channel {
        builder.push(" AND channel = ").push_bind(channel.as_str());
    }
    if let Some(status) = &filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = filter.created_from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
    builder.push(" ORDER BY created_at DESC, id DESC");
    builder
}

/// `Degraded` once every pooled connection is in use.
fn pool_saturation(size: u32, idle: usize, max_connections: u32) -> Option<HealthStatus> {
    (size >= max_connections && idle == 0).then(|| {
        HealthStatus::Degraded(format!("connection pool exhausted ({size}/{max_connections} in use)"))
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        quantity: row.try_get("quantity")?,
        version: row.try_get("version")?,
    })
}

fn order_header_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let channel: String = row.try_get("channel")?;
    let channel: SalesChannel = channel.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Order {
        id: row.try_get("id")?,
        version: row.try_get("version")?,
        channel,
        customer_name: row.try_get("customer_name")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        shipping_address: row.try_get("shipping_address")?,
        status: row.try_get("status")?,
        total_amount: row.try_get("total_amount")?,
        items: Vec::new(),
        created_at,
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        quantity: row.try_get("quantity")?,
        price: row.try_get("price")?,
    })
}

impl IsTransient for sqlx::Error {
    fn is_transient(&self) -> bool {
        match self {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
            // Class 08 = connection exception, 57P03 = cannot_connect_now
            sqlx::Error::Database(db) => db
                .code()
                .is_some_and(|code| code.starts_with("08") || code == "57P03"),
            _ => false,
        }
    }
}

// ============================================================================
// Unit of Work
// ============================================================================

pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    async fn insert_items(&mut self, order: &Order) -> Result<(), StoreError> {
        for (position, item) in order.items.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoreError::Constraint(format!("order {} has too many items", order.id)))?;
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, position, quantity, price)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.product_id)
            .bind(position)
            .bind(item.quantity)
            .bind(item.price)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStockStore for PostgresUnitOfWork {
    async fn product_by_id(&mut self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, name, price, quantity, version FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn save_product(&mut self, product: &Product) -> Result<Product, StoreError> {
        if product.quantity < 0 {
            return Err(StoreError::Constraint(format!(
                "stock for product {} cannot be negative ({})",
                product.id, product.quantity
            )));
        }

        let row = sqlx::query(
            "UPDATE products
             SET quantity = $1, version = version + 1, updated_at = NOW()
             WHERE id = $2 AND version = $3
             RETURNING id, name, price, quantity, version",
        )
        .bind(product.quantity)
        .bind(product.id)
        .bind(product.version)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => product_from_row(&row),
            None => Err(StoreError::Conflict { entity: "product", id: product.id }),
        }
    }
}

#[async_trait]
impl OrderStore for PostgresUnitOfWork {
    async fn order_by_id(&mut self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut orders = PostgresStore::load_orders(&mut *self.tx, vec![row]).await?;
        Ok(orders.pop())
    }

    async fn create_order(&mut self, order: &Order) -> Result<Order, StoreError> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(order.id)
        .bind(order.version)
        .bind(order.channel.as_str())
        .bind(&order.customer_name)
        .bind(&order.phone)
        .bind(&order.email)
        .bind(&order.shipping_address)
        .bind(&order.status)
        .bind(order.total_amount)
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await?;

        self.insert_items(order).await?;
        Ok(order.clone())
    }

    async fn update_order(&mut self, order: &Order) -> Result<Order, StoreError> {
        let row = sqlx::query(
            "UPDATE orders
             SET version = version + 1, channel = $1, customer_name = $2, phone = $3, email = $4,
                 shipping_address = $5, status = $6, total_amount = $7
             WHERE id = $8 AND version = $9
             RETURNING version",
        )
        .bind(order.channel.as_str())
        .bind(&order.customer_name)
        .bind(&order.phone)
        .bind(&order.email)
        .bind(&order.shipping_address)
        .bind(&order.status)
        .bind(order.total_amount)
        .bind(order.id)
        .bind(order.version)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Err(StoreError::Conflict { entity: "order", id: order.id });
        };

        // Items are owned by the order: replace the whole set.
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut *self.tx)
            .await?;
        self.insert_items(order).await?;

        let mut saved = order.clone();
        saved.version = row.try_get("version")?;
        Ok(saved)
    }

    async fn delete_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND version = $2")
            .bind(order.id)
            .bind(order.version)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict { entity: "order", id: order.id });
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// ============================================================================
// Store (committed reads)
// ============================================================================

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        // Header and items must come from the same snapshot.
        let mut tx = self.begin_snapshot().await?;
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let order = match row {
            Some(row) => Self::load_orders(&mut *tx, vec![row]).await?.pop(),
            None => None,
        };
        tx.commit().await?;
        Ok(order)
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut tx = self.begin_snapshot().await?;

        let rows = list_orders_query(filter).build().fetch_all(&mut *tx).await?;
        let orders = Self::load_orders(&mut *tx, rows).await?;
        tx.commit().await?;
        Ok(orders)
    }

    async fn recent_orders(&self, limit: usize) -> Result<Vec<Order>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut tx = self.begin_snapshot().await?;

        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;
        let orders = Self::load_orders(&mut *tx, rows).await?;
        tx.commit().await?;
        Ok(orders)
    }

    async fn order_rollups(&self) -> Result<OrderRollups, StoreError> {
        let mut tx = self.begin_snapshot().await?;

        let channel_rows = sqlx::query(
            "SELECT channel, COUNT(id) AS count, COALESCE(SUM(total_amount), 0)::BIGINT AS revenue
             FROM orders GROUP BY channel ORDER BY channel",
        )
        .fetch_all(&mut *tx)
        .await?;

        let status_rows = sqlx::query(
            "SELECT status, COUNT(id) AS count FROM orders GROUP BY status ORDER BY status NULLS FIRST",
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut by_channel = Vec::with_capacity(channel_rows.len());
        for row in &channel_rows {
            let channel: String = row.try_get("channel")?;
            by_channel.push(ChannelRollup {
                channel: channel.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))?,
                count: row.try_get("count")?,
                revenue: row.try_get("revenue")?,
            });
        }
        by_channel.sort_by_key(|rollup| rollup.channel);

        let by_status = status_rows
            .iter()
            .map(|row| {
                Ok(StatusRollup {
                    status: row.try_get("status")?,
                    count: row.try_get("count")?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(OrderRollups { by_channel, by_status })
    }

    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, name, price, quantity, version FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn health_check(&self) -> ComponentHealth {
        let size = self.pool.size();
        let idle = self.pool.num_idle();
        let details = format!("{size}/{} connections, {idle} idle", self.max_connections);

        // Every connection is checked out; a SELECT here would queue behind them.
        if let Some(degraded) = pool_saturation(size, idle, self.max_connections) {
            return ComponentHealth::new("postgres_store", degraded).with_details(details);
        }

        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => ComponentHealth::new("postgres_store", HealthStatus::Healthy).with_details(details),
            Err(e) => ComponentHealth::new("postgres_store", HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
//
// Query construction and error classification run everywhere. The `live`
// tests need a Postgres at DATABASE_URL and are skipped when it is unset.
//
// ============================================================================
