use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Order, OrderStatus};

const ORDER_COLUMNS: &str = r#"
    id, order_id, amount, currency, receipt, notes, status,
    user_id, customer_email, payment_id, signature, idempotency_key,
    completed_at, created_at, updated_at
"#;

/// Insert payload for an order row. The gateway assigns `order_id` before we
/// ever write, so the write can key on it.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: Option<serde_json::Value>,
    pub user_id: Option<String>,
    pub customer_email: Option<String>,
    pub idempotency_key: Option<String>,
}

pub struct OrderRepository;

impl OrderRepository {
    /// Idempotent upsert keyed by the gateway order id. A client retry that
    /// re-submits the same order overwrites the row instead of duplicating
    /// it; last write wins.
    pub async fn upsert(pool: &PgPool, order: &NewOrder) -> AppResult<Order> {
        let now = Utc::now();

        let query = format!(
            r#"
            INSERT INTO orders (
                id, order_id, amount, currency, receipt, notes, status,
                user_id, customer_email, idempotency_key, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            ON CONFLICT (order_id) DO UPDATE SET
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                receipt = EXCLUDED.receipt,
                notes = EXCLUDED.notes,
                user_id = EXCLUDED.user_id,
                customer_email = EXCLUDED.customer_email,
                idempotency_key = EXCLUDED.idempotency_key,
                updated_at = EXCLUDED.updated_at
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, Order>(&query)
            .bind(Uuid::new_v4())
            .bind(&order.order_id)
            .bind(order.amount)
            .bind(&order.currency)
            .bind(&order.receipt)
            .bind(&order.notes)
            .bind(OrderStatus::Created)
            .bind(&order.user_id)
            .bind(&order.customer_email)
            .bind(&order.idempotency_key)
            .bind(now)
            .fetch_one(pool)
            .await?;

        Ok(row)
    }

    pub async fn find_by_order_id(pool: &PgPool, order_id: &str) -> AppResult<Option<Order>> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1");

        let row = sqlx::query_as::<_, Order>(&query)
            .bind(order_id)
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }

    /// Looks up a still-unpaid order minted for the same idempotency key, so
    /// a client retry of "create order" does not mint a second gateway order
    /// for one cart.
    pub async fn find_created_by_idempotency_key(
        pool: &PgPool,
        key: &str,
    ) -> AppResult<Option<Order>> {
        let query = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE idempotency_key = $1 AND status = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );

        let row = sqlx::query_as::<_, Order>(&query)
            .bind(key)
            .bind(OrderStatus::Created)
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }

    /// One-way `created` -> `completed` transition, applied when a signature
    /// verification succeeds for the order id. Re-applying is harmless:
    /// `completed_at` keeps its first value.
    pub async fn mark_completed(
        pool: &PgPool,
        order_id: &str,
        payment_id: Option<&str>,
        signature: Option<&str>,
    ) -> AppResult<Option<Order>> {
        let now = Utc::now();

        let query = format!(
            r#"
            UPDATE orders
            SET status = $2,
                payment_id = COALESCE($3, payment_id),
                signature = COALESCE($4, signature),
                completed_at = COALESCE(completed_at, $5),
                updated_at = $5
            WHERE order_id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, Order>(&query)
            .bind(order_id)
            .bind(OrderStatus::Completed)
            .bind(payment_id)
            .bind(signature)
            .bind(now)
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }

    /// Attaches the gateway payment id without touching the status. Used for
    /// `payment.authorized` webhooks, where funds are held but not captured.
    pub async fn attach_payment_id(
        pool: &PgPool,
        order_id: &str,
        payment_id: &str,
    ) -> AppResult<Option<Order>> {
        let query = format!(
            r#"
            UPDATE orders
            SET payment_id = $2, updated_at = $3
            WHERE order_id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, Order>(&query)
            .bind(order_id)
            .bind(payment_id)
            .bind(Utc::now())
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }

    pub async fn list_by_user(pool: &PgPool, user_id: &str) -> AppResult<Vec<Order>> {
        let query = format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        );

        let rows = sqlx::query_as::<_, Order>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await?;

        Ok(rows)
    }
}
