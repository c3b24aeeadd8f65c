use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::{NewOrder, OrderPatch};
use super::errors::OrderError;
use super::value_objects::{OrderItem, OrderItemRequest, SalesChannel};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// Invariant: `total_amount == sum(item.price * item.quantity)` over the items
// currently attached. Every mutation of `items` goes through `replace_items`,
// which recomputes the total.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub version: i64,

    // Header
    pub channel: SalesChannel,
    pub customer_name: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub shipping_address: Option<String>,
    pub status: Option<String>,

    // Contents
    pub total_amount: i64,
    pub items: Vec<OrderItem>,

    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Build a new, not yet persisted order from a validated command.
    pub fn place(command: NewOrder) -> Result<Self, OrderError> {
        let mut order = Self {
            id: Uuid::now_v7(),
            version: 0,
            channel: command.channel,
            customer_name: command.customer_name,
            phone: command.phone,
            email: command.email,
            shipping_address: command.shipping_address,
            status: command.status,
            total_amount: 0,
            items: Vec::new(),
            created_at: Utc::now(),
        };
        order.replace_items(&command.items)?;
        Ok(order)
    }

    /// Replace the full line-item set and recompute the total.
    pub fn replace_items(&mut self, requests: &[OrderItemRequest]) -> Result<(), OrderError> {
        let items: Vec<OrderItem> = requests.iter().map(OrderItem::from_request).collect();
        self.total_amount = compute_total(&items)?;
        self.items = items;
        Ok(())
    }

    /// Apply scalar header fields. `items` is handled by the mutation processor.
    pub fn apply_patch(&mut self, patch: &OrderPatch) {
        if let Some(channel) = patch.channel {
            self.channel = channel;
        }
        if let Some(customer_name) = &patch.customer_name {
            self.customer_name = Some(customer_name.clone());
        }
        if let Some(phone) = &patch.phone {
            self.phone = phone.clone();
        }
        if let Some(email) = &patch.email {
            self.email = Some(email.clone());
        }
        if let Some(shipping_address) = &patch.shipping_address {
            self.shipping_address = Some(shipping_address.clone());
        }
        if let Some(status) = &patch.status {
            self.status = Some(status.clone());
        }
    }

    pub fn item_requests(&self) -> Vec<OrderItemRequest> {
        self.items
            .iter()
            .map(|item| OrderItemRequest::new(item.product_id, item.quantity, item.price))
            .collect()
    }

    pub fn total_is_consistent(&self) -> bool {
        compute_total(&self.items).is_ok_and(|total| total == self.total_amount)
    }
}

/// Sum of `price * quantity`, failing on overflow.
pub fn compute_total(items: &[OrderItem]) -> Result<i64, OrderError> {
    items.iter().try_fold(0i64, |acc, item| {
        item.line_total()
            .and_then(|line| acc.checked_add(line))
            .ok_or_else(|| OrderError::validation("order total exceeds the supported amount range"))
    })
}

// ============================================================================
// Unit Tests
// ============================================================================
