// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

use crate::domain::order::{OrderError, SalesChannel};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for order and stock operations
// ============================================================================
//
// Provides metrics for:
// - Orders created per sales channel
// - Failed operations by operation and error kind
// - Operation latency
// - Stock units reserved and released
// - Update rollbacks and optimistic-concurrency conflicts
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Operation labels used across the metrics.
pub mod operation {
    pub const CREATE: &str = "create";
    pub const UPDATE: &str = "update";
    pub const REMOVE: &str = "remove";
    pub const STATISTICS: &str = "statistics";
}

/// Central metrics registry for the engine
pub struct Metrics {
    registry: Registry,

    // Order Metrics
    pub orders_created: IntCounterVec,
    pub operations_failed: IntCounterVec,
    pub operation_duration: HistogramVec,

    // Stock Metrics
    pub stock_units_reserved: IntCounter,
    pub stock_units_released: IntCounter,

    // Consistency Metrics
    pub update_rollbacks: IntCounter,
    pub stock_conflicts: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Metrics
        let orders_created = IntCounterVec::new(
            Opts::new("orders_created_total", "Total orders created"),
            &["channel"],
        )?;
        registry.register(Box::new(orders_created.clone()))?;

        let operations_failed = IntCounterVec::new(
            Opts::new("order_operations_failed_total", "Total order operations that failed"),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(operations_failed.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Order operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        // Stock Metrics
        let stock_units_reserved = IntCounter::new("stock_units_reserved_total", "Total stock units reserved by orders")?;
        registry.register(Box::new(stock_units_reserved.clone()))?;

        let stock_units_released = IntCounter::new("stock_units_released_total", "Total stock units released by orders")?;
        registry.register(Box::new(stock_units_released.clone()))?;

        // Consistency Metrics
        let update_rollbacks = IntCounter::new(
            "order_update_rollbacks_total",
            "Item replacements rolled back after the new items failed validation",
        )?;
        registry.register(Box::new(update_rollbacks.clone()))?;

        let stock_conflicts = IntCounter::new(
            "stock_conflicts_total",
            "Operations rejected because a product or order changed concurrently",
        )?;
        registry.register(Box::new(stock_conflicts.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            operations_failed,
            operation_duration,
            stock_units_reserved,
            stock_units_released,
            update_rollbacks,
            stock_conflicts,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_duration(&self, operation: &str, duration_secs: f64) {
        self.operation_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn record_order_created(&self, channel: SalesChannel) {
        self.orders_created.with_label_values(&[channel.as_str()]).inc();
    }

    pub fn record_stock_movement(&self, reserved: u64, released: u64) {
        self.stock_units_reserved.inc_by(reserved);
        self.stock_units_released.inc_by(released);
    }

    /// Helper to record a failed operation, labelled by error kind
    pub fn record_failure(&self, operation: &str, error: &OrderError) {
        self.operations_failed.with_label_values(&[operation, error.kind()]).inc();
        if matches!(error, OrderError::ConcurrentModification(_)) {
            self.stock_conflicts.inc();
        }
    }

    pub fn record_update_rollback(&self) {
        self.update_rollbacks.inc();
    }
}
