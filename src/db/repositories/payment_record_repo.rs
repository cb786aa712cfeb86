use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{
    CustomerDetails, FulfillmentStatus, OrderItem, OrderStatus, PaymentRecord, PaymentStatus,
};

const RECORD_COLUMNS: &str = r#"
    order_id, payment_id, signature, amount, currency, total_amount, items,
    user_id, customer, status, payment_status, fulfillment_status,
    payment_date, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub amount: i64,
    pub currency: String,
    pub total_amount: i64,
    pub items: Vec<OrderItem>,
    pub user_id: Option<String>,
    pub customer: Option<CustomerDetails>,
    pub payment_date: DateTime<Utc>,
}

pub struct PaymentRecordRepository;

impl PaymentRecordRepository {
    /// Idempotent upsert keyed by the gateway order id: a duplicate backup
    /// write refreshes the payload and `updated_at`, never creates a second
    /// row. Fulfillment is deliberately NOT overwritten, so an admin's
    /// correction survives a late client retry.
    pub async fn upsert(pool: &PgPool, record: &NewPaymentRecord) -> AppResult<PaymentRecord> {
        let now = Utc::now();

        let query = format!(
            r#"
            INSERT INTO payment_records (
                order_id, payment_id, signature, amount, currency, total_amount,
                items, user_id, customer, status, payment_status,
                fulfillment_status, payment_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
            ON CONFLICT (order_id) DO UPDATE SET
                payment_id = EXCLUDED.payment_id,
                signature = EXCLUDED.signature,
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                total_amount = EXCLUDED.total_amount,
                items = EXCLUDED.items,
                user_id = EXCLUDED.user_id,
                customer = EXCLUDED.customer,
                payment_date = EXCLUDED.payment_date,
                updated_at = EXCLUDED.updated_at
            RETURNING {RECORD_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(&record.order_id)
            .bind(&record.payment_id)
            .bind(&record.signature)
            .bind(record.amount)
            .bind(&record.currency)
            .bind(record.total_amount)
            .bind(Json(&record.items))
            .bind(&record.user_id)
            .bind(record.customer.as_ref().map(Json))
            .bind(OrderStatus::Completed)
            .bind(PaymentStatus::Paid)
            .bind(FulfillmentStatus::Unfulfilled)
            .bind(record.payment_date)
            .bind(now)
            .fetch_one(pool)
            .await?;

        Ok(row)
    }

    pub async fn find(pool: &PgPool, order_id: &str) -> AppResult<Option<PaymentRecord>> {
        let query = format!("SELECT {RECORD_COLUMNS} FROM payment_records WHERE order_id = $1");

        let row = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(order_id)
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }

    pub async fn list_by_user(pool: &PgPool, user_id: &str) -> AppResult<Vec<PaymentRecord>> {
        let query = format!(
            r#"
            SELECT {RECORD_COLUMNS} FROM payment_records
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        );

        let rows = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await?;

        Ok(rows)
    }

    /// Back-office fulfillment correction. The only mutation a record sees
    /// after its initial write.
    pub async fn update_fulfillment(
        pool: &PgPool,
        order_id: &str,
        status: FulfillmentStatus,
    ) -> AppResult<PaymentRecord> {
        let query = format!(
            r#"
            UPDATE payment_records
            SET fulfillment_status = $2, updated_at = $3
            WHERE order_id = $1
            RETURNING {RECORD_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(order_id)
            .bind(status)
            .bind(Utc::now())
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Payment record {} not found", order_id))
            })?;

        Ok(row)
    }
}
