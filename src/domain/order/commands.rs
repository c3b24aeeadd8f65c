use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::value_objects::{OrderItemRequest, SalesChannel};

// ============================================================================
// Order Commands - Represent caller intent
// ============================================================================

/// Payload for placing a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub channel: SalesChannel,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub items: Vec<OrderItemRequest>,
}

impl NewOrder {
    pub fn new(channel: SalesChannel, phone: impl Into<String>, items: Vec<OrderItemRequest>) -> Self {
        Self {
            channel,
            customer_name: None,
            phone: phone.into(),
            email: None,
            shipping_address: None,
            status: None,
            items,
        }
    }

    pub fn with_customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Shape checks that need no store access.
    pub fn validate(&self) -> Result<(), OrderError> {
        validate_phone(&self.phone)?;
        validate_items(&self.items)
    }
}

/// Partial update of an order. Omitted fields are left unchanged; `items`,
/// when present, replaces the whole line-item set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    #[serde(default)]
    pub channel: Option<SalesChannel>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<OrderItemRequest>>,
}

impl OrderPatch {
    pub fn items(items: Vec<OrderItemRequest>) -> Self {
        Self {
            items: Some(items),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), OrderError> {
        if let Some(phone) = &self.phone {
            validate_phone(phone)?;
        }
        if let Some(items) = &self.items {
            validate_items(items)?;
        }
        Ok(())
    }
}

/// Filters for listing orders. Date bounds are inclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    #[serde(default)]
    pub channel: Option<SalesChannel>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn matches(&self, channel: SalesChannel, status: Option<&str>, created_at: DateTime<Utc>) -> bool {
        if self.channel.is_some_and(|wanted| wanted != channel) {
            return false;
        }
        if let Some(wanted) = self.status.as_deref() {
            if status != Some(wanted) {
                return false;
            }
        }
        if self.created_from.is_some_and(|from| created_at < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| created_at > to) {
            return false;
        }
        true
    }
}

fn validate_phone(phone: &str) -> Result<(), OrderError> {
    if phone.trim().is_empty() {
        return Err(OrderError::validation("phone is required"));
    }
    Ok(())
}

fn validate_items(items: &[OrderItemRequest]) -> Result<(), OrderError> {
    if items.is_empty() {
        return Err(OrderError::validation("order must contain at least one item"));
    }

    for (index, item) in items.iter().enumerate() {
        if item.quantity < 1 {
            return Err(OrderError::validation(format!(
                "item {} ({}): quantity must be at least 1, got {}",
                index, item.product_id, item.quantity
            )));
        }
        if item.price < 0 {
            return Err(OrderError::validation(format!(
                "item {} ({}): price must not be negative, got {}",
                index, item.product_id, item.price
            )));
        }
    }

    Ok(())
}
