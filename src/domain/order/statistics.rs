use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::aggregate::Order;
use super::errors::OrderError;
use super::value_objects::SalesChannel;
use crate::store::{OrderRollups, Store};

// ============================================================================
// Statistics Aggregator - read-only views over committed orders
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatistics {
    pub channel: SalesChannel,
    pub count: i64,
    pub total_revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusStatistics {
    pub status: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatistics {
    pub total_orders: i64,
    pub total_revenue: i64,
    pub orders_by_channel: Vec<ChannelStatistics>,
    pub orders_by_status: Vec<StatusStatistics>,
}

impl OrderStatistics {
    /// Totals are derived from the channel groups so every figure comes from
    /// the same snapshot.
    pub fn from_rollups(rollups: OrderRollups) -> Result<Self, OrderError> {
        let mut total_orders = 0i64;
        let mut total_revenue = 0i64;
        for rollup in &rollups.by_channel {
            total_orders += rollup.count;
            total_revenue = total_revenue
                .checked_add(rollup.revenue)
                .ok_or_else(|| OrderError::validation("total revenue exceeds the supported amount range"))?;
        }

        Ok(Self {
            total_orders,
            total_revenue,
            orders_by_channel: rollups
                .by_channel
                .into_iter()
                .map(|r| ChannelStatistics {
                    channel: r.channel,
                    count: r.count,
                    total_revenue: r.revenue,
                })
                .collect(),
            orders_by_status: rollups
                .by_status
                .into_iter()
                .map(|r| StatusStatistics {
                    status: r.status,
                    count: r.count,
                })
                .collect(),
        })
    }
}

pub struct StatisticsAggregator {
    store: Arc<dyn Store>,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get_statistics(&self) -> Result<OrderStatistics, OrderError> {
        let rollups = self.store.order_rollups().await?;
        let statistics = OrderStatistics::from_rollups(rollups)?;

        tracing::debug!(
            total_orders = statistics.total_orders,
            total_revenue = statistics.total_revenue,
            "Computed order statistics"
        );
        Ok(statistics)
    }

    /// The `limit` most recent orders, newest first, items attached.
    pub async fn get_recent(&self, limit: usize) -> Result<Vec<Order>, OrderError> {
        Ok(self.store.recent_orders(limit).await?)
    }
}
