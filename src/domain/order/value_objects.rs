use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Sales channel an order originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesChannel {
    Offline,
    Shopee,
    Tiktok,
}

impl SalesChannel {
    pub const ALL: [SalesChannel; 3] = [SalesChannel::Offline, SalesChannel::Shopee, SalesChannel::Tiktok];

    pub fn as_str(&self) -> &'static str {
        match self {
            SalesChannel::Offline => "offline",
            SalesChannel::Shopee => "shopee",
            SalesChannel::Tiktok => "tiktok",
        }
    }
}

impl fmt::Display for SalesChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unknown sales channel: {0} (expected offline, shopee or tiktok)")]
pub struct UnknownChannel(pub String);

impl FromStr for SalesChannel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(SalesChannel::Offline),
            "shopee" => Ok(SalesChannel::Shopee),
            "tiktok" => Ok(SalesChannel::Tiktok),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}

/// A line item attached to a persisted order.
///
/// `price` is the unit price captured when the item was placed, not a live
/// reference to the product's current price.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: i64,
}

impl OrderItem {
    pub fn from_request(request: &OrderItemRequest) -> Self {
        Self {
            id: Uuid::now_v7(),
            product_id: request.product_id,
            quantity: request.quantity,
            price: request.price,
        }
    }

    /// Line total, `None` on overflow.
    pub fn line_total(&self) -> Option<i64> {
        self.price.checked_mul(i64::from(self.quantity))
    }
}

/// A requested line item as supplied by the caller.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: i64,
}

impl OrderItemRequest {
    pub fn new(product_id: Uuid, quantity: i32, price: i64) -> Self {
        Self { product_id, quantity, price }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
