use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a gateway order. One-way: `created` -> `completed`, set only
/// when a signature verification succeeds for the order id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    /// Gateway-assigned order id, unique across the table.
    pub order_id: String,
    /// Minor currency units (paise for INR).
    pub amount: i64,
    pub currency: String,
    /// Timestamp-derived receipt. Human correlation only; not unique across
    /// client retries.
    pub receipt: String,
    pub notes: Option<serde_json::Value>,
    pub status: OrderStatus,
    pub user_id: Option<String>,
    pub customer_email: Option<String>,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
    pub idempotency_key: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.order_id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt,
            status: order.status,
            payment_id: order.payment_id,
            created_at: order.created_at,
        }
    }
}
