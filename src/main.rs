use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

mod config;
mod domain;
mod health;
mod metrics;
mod store;
mod utils;

use config::AppConfig;
use domain::inventory::Product;
use domain::order::{NewOrder, OrderCommandHandler, OrderError, OrderItemRequest, OrderPatch, SalesChannel};
use store::{InMemoryStore, PostgresStore, Store};
use utils::RetryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER)))
        .init();

    tracing::info!("🚀 Starting Omni Sales order & inventory engine");

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    // === 1. Initialize Prometheus metrics ===
    tracing::info!("Initializing metrics");
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Select the store and seed the demo product ===
    let demo_product = Product::new(Uuid::new_v4(), "Demo Wireless Earbuds", 100, 5);
    let (store, demo_product): (Arc<dyn Store>, Product) = match &config.database {
        Some(database) => {
            let postgres = PostgresStore::connect_with_retry(database, RetryConfig::startup())
                .await
                .context("Failed to connect to Postgres")?;
            postgres.ensure_schema().await?;
            let product = postgres.upsert_product(&demo_product).await?;
            (Arc::new(postgres), product)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            let memory = InMemoryStore::new();
            let product = memory.insert_product(demo_product).await;
            (Arc::new(memory), product)
        }
    };

    // === 3. Start metrics HTTP server in background thread ===
    let metrics_registry = metrics.registry().clone();
    let health_store = store.clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let result = actix_web::rt::System::new()
            .block_on(metrics::start_metrics_server(metrics_registry, health_store, metrics_port));
        if let Err(e) = result {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 4. Demonstrate the order lifecycle ===
    let handler = OrderCommandHandler::new(store.clone(), metrics.clone(), config.recent_orders_limit);
    match run_demo(&handler, store.as_ref(), &demo_product).await {
        Ok(()) => tracing::info!("🎉 Demo complete!"),
        Err(e) => tracing::error!(error = ?e, "Demo scenario failed"),
    }

    tracing::info!("Serving /metrics and /health on port {}, press Ctrl-C to stop", config.metrics_port);
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}

/// create → rejected oversized update → remove, checking stock after each step.
async fn run_demo(handler: &OrderCommandHandler, store: &dyn Store, product: &Product) -> anyhow::Result<()> {
    tracing::info!("📝 Demonstrating order lifecycle with stock reservation");

    let order = handler
        .create_order(
            NewOrder::new(
                SalesChannel::Shopee,
                "0901234567",
                vec![OrderItemRequest::new(product.id, 3, product.price)],
            )
            .with_customer_name("Demo Customer")
            .with_status("pending"),
        )
        .await?;
    let stock = current_stock(store, product.id).await?;
    tracing::info!(order_id = %order.id, total_amount = order.total_amount, stock, "✅ Order created");
    anyhow::ensure!(order.total_amount == 300, "unexpected total {}", order.total_amount);
    anyhow::ensure!(stock == product.quantity - 3, "unexpected stock {stock} after create");

    let patch = OrderPatch::items(vec![OrderItemRequest::new(product.id, 10, product.price)]);
    match handler.update_order(order.id, patch).await {
        Err(OrderError::InsufficientStock { requested, available, .. }) => {
            tracing::info!(requested, available, "✅ Oversized update rejected")
        }
        Err(other) => return Err(other.into()),
        Ok(_) => anyhow::bail!("update beyond available stock was accepted"),
    }
    let unchanged = handler.get_order(order.id).await?;
    let stock = current_stock(store, product.id).await?;
    anyhow::ensure!(unchanged.items == order.items, "items changed by a rejected update");
    anyhow::ensure!(stock == product.quantity - 3, "unexpected stock {stock} after rejected update");

    let statistics = handler.get_statistics().await?;
    tracing::info!(
        total_orders = statistics.total_orders,
        total_revenue = statistics.total_revenue,
        "📊 Statistics"
    );
    let recent = handler.get_recent_orders(None).await?;
    tracing::info!(count = recent.len(), "Recent orders loaded");

    handler.remove_order(order.id).await?;
    let stock = current_stock(store, product.id).await?;
    tracing::info!(order_id = %order.id, stock, "✅ Order removed");
    anyhow::ensure!(stock == product.quantity, "unexpected stock {stock} after remove");

    Ok(())
}

async fn current_stock(store: &dyn Store, product_id: Uuid) -> anyhow::Result<i32> {
    let product = store
        .find_product(product_id)
        .await?
        .with_context(|| format!("product {product_id} disappeared"))?;
    Ok(product.quantity)
}
