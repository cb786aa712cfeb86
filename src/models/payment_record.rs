use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::OrderStatus;

/// Payment lifecycle of the backup record. Independent from fulfillment:
/// a paid order may sit unfulfilled for days.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "fulfillment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Unfulfilled,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    /// Minor currency units per unit.
    pub price: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Snapshot of the customer at checkout time. Kept on the record so the
/// order history survives later profile edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Backup record of a successful payment, keyed by the gateway order id.
/// Written best-effort by the client as soon as the gateway callback fires,
/// before verification is relied upon; never deleted automatically.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub amount: i64,
    pub currency: String,
    pub total_amount: i64,
    pub items: Json<Vec<OrderItem>>,
    /// None for guest checkouts.
    pub user_id: Option<String>,
    pub customer: Option<Json<CustomerDetails>>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub payment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the account screen's order history, merged across the orders
/// table and the payment-record backups.
#[derive(Debug, Clone, Serialize)]
pub struct OrderHistoryEntry {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_status: Option<FulfillmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItem>>,
    pub created_at: DateTime<Utc>,
}

impl From<crate::models::Order> for OrderHistoryEntry {
    fn from(order: crate::models::Order) -> Self {
        Self {
            order_id: order.order_id,
            amount: order.amount,
            currency: order.currency,
            status: order.status,
            payment_id: order.payment_id,
            payment_status: None,
            fulfillment_status: None,
            items: None,
            created_at: order.created_at,
        }
    }
}

impl From<PaymentRecord> for OrderHistoryEntry {
    fn from(record: PaymentRecord) -> Self {
        Self {
            order_id: record.order_id,
            amount: record.amount,
            currency: record.currency,
            status: record.status,
            payment_id: Some(record.payment_id),
            payment_status: Some(record.payment_status),
            fulfillment_status: Some(record.fulfillment_status),
            items: Some(record.items.0),
            created_at: record.created_at,
        }
    }
}
