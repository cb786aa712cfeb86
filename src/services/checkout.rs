use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::config::{Config, RazorpayConfig, RetryConfig};
use crate::db::repositories::{
    NewOrder, NewPaymentRecord, OrderRepository, PaymentRecordRepository,
};
use crate::error::{AppError, AppResult};
use crate::models::{Order, OrderHistoryEntry, PaymentRecord};
use crate::services::razorpay::{
    CreateOrderRequest, GatewayError, OrderGateway, RazorpayOrder, SignatureVerifier,
};

/// Width of the time bucket folded into derived idempotency keys. Two
/// identical "create order" submissions within one bucket share a key and
/// therefore share a gateway order.
const IDEMPOTENCY_BUCKET_SECS: i64 = 300;

/// Orchestrates the order/payment lifecycle: mints gateway orders under a
/// transient-only retry policy, verifies checkout signatures fail-closed,
/// and persists the order rows and backup payment records.
pub struct CheckoutService {
    gateway: Arc<dyn OrderGateway>,
    razorpay: RazorpayConfig,
    retry: RetryConfig,
}

impl CheckoutService {
    pub fn new(config: &Config, gateway: Arc<dyn OrderGateway>) -> Self {
        Self {
            gateway,
            razorpay: config.razorpay.clone(),
            retry: config.retry.clone(),
        }
    }

    /// Creates a hosted gateway order for `amount` major currency units and
    /// persists it. Validation happens before any network call; a repeat
    /// submission with the same idempotency key returns the already-minted
    /// order instead of creating a second one.
    pub async fn create_order(
        &self,
        pool: &PgPool,
        amount: f64,
        user_id: &str,
        email: &str,
        idempotency_key: Option<String>,
    ) -> AppResult<Order> {
        if self.razorpay.key_id.is_empty() || self.razorpay.key_secret.is_empty() {
            return Err(AppError::Config(
                "Razorpay credentials are not configured".to_string(),
            ));
        }

        let request = self.build_order_request(amount, user_id, email)?;

        let key = idempotency_key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| derive_idempotency_key(user_id, request.amount, Utc::now()));

        if let Some(existing) =
            OrderRepository::find_created_by_idempotency_key(pool, &key).await?
        {
            tracing::info!(
                order_id = %existing.order_id,
                idempotency_key = %key,
                "Reusing unpaid order for repeated create request"
            );
            return Ok(existing);
        }

        let gateway_order = self.create_gateway_order(&request).await?;

        let order = OrderRepository::upsert(
            pool,
            &NewOrder {
                order_id: gateway_order.id.clone(),
                amount: gateway_order.amount,
                currency: gateway_order.currency.clone(),
                receipt: gateway_order
                    .receipt
                    .clone()
                    .or(request.receipt)
                    .unwrap_or_default(),
                notes: request.notes,
                user_id: Some(user_id.to_string()),
                customer_email: Some(email.to_string()),
                idempotency_key: Some(key),
            },
        )
        .await?;

        tracing::info!(
            order_id = %order.order_id,
            amount = order.amount,
            "Gateway order created"
        );

        Ok(order)
    }

    /// Validates the caller's amount and assembles the gateway request.
    /// Rejecting here guarantees an invalid amount never reaches the wire.
    fn build_order_request(
        &self,
        amount: f64,
        user_id: &str,
        email: &str,
    ) -> AppResult<CreateOrderRequest> {
        let minor = to_minor_units(amount)?;

        Ok(CreateOrderRequest {
            amount: minor,
            currency: self.razorpay.currency.clone(),
            receipt: Some(make_receipt(Utc::now())),
            notes: Some(serde_json::json!({
                "user_id": user_id,
                "email": email,
            })),
            partial_payment: Some(false),
        })
    }

    /// Calls the gateway under exponential backoff. Only errors the gateway
    /// itself classifies as transient are retried; everything else fails on
    /// the first attempt. Total attempts are capped at `max_retries + 1`.
    async fn create_gateway_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<RazorpayOrder, GatewayError> {
        let mut delay = Duration::from_millis(self.retry.base_delay_ms);
        let mut attempt: u32 = 0;

        loop {
            match self.gateway.create_order(request).await {
                Ok(order) => return Ok(order),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient gateway error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Verifies a checkout callback signature with the server-held secret
    /// and, on success, marks the order completed in the same request.
    /// A mismatch is a normal `Ok(false)`; internal failures propagate as
    /// errors with verification treated as failed.
    pub async fn verify_payment(
        &self,
        pool: &PgPool,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> AppResult<bool> {
        let verified = SignatureVerifier::verify_payment_signature(
            order_id,
            payment_id,
            signature,
            &self.razorpay.key_secret,
        )?;

        if !verified {
            tracing::warn!(order_id, "Payment signature mismatch");
            return Ok(false);
        }

        match OrderRepository::mark_completed(pool, order_id, Some(payment_id), Some(signature))
            .await?
        {
            Some(order) => {
                tracing::info!(
                    order_id = %order.order_id,
                    payment_id,
                    "Payment verified, order completed"
                );
            }
            None => {
                // The signature is genuine even if we never saw the order
                // (partial failure between creation and persistence).
                tracing::warn!(order_id, "Verified payment for unknown order");
            }
        }

        Ok(true)
    }

    /// Best-effort backup write of a successful payment. Idempotent: the
    /// record is keyed by the gateway order id.
    pub async fn record_payment(
        &self,
        pool: &PgPool,
        record: &NewPaymentRecord,
    ) -> AppResult<PaymentRecord> {
        let stored = PaymentRecordRepository::upsert(pool, record).await?;

        tracing::info!(
            order_id = %stored.order_id,
            payment_id = %stored.payment_id,
            "Payment record stored"
        );

        Ok(stored)
    }

    /// Merged order history for the account screens: orders and backup
    /// payment records, de-duplicated by gateway order id, newest first.
    pub async fn order_history(
        &self,
        pool: &PgPool,
        user_id: &str,
    ) -> AppResult<Vec<OrderHistoryEntry>> {
        let orders = OrderRepository::list_by_user(pool, user_id).await?;
        let records = PaymentRecordRepository::list_by_user(pool, user_id).await?;

        Ok(merge_history(orders, records))
    }

    pub async fn gateway_healthy(&self) -> bool {
        self.gateway.ping().await.is_ok()
    }

    pub fn key_id(&self) -> &str {
        &self.razorpay.key_id
    }
}

/// Major units -> minor units, `round(amount * 100)`. Rejects anything that
/// is not a finite positive amount of at least one minor unit.
pub fn to_minor_units(amount: f64) -> AppResult<i64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation(
            "Amount must be a positive number".to_string(),
        ));
    }

    let minor = (amount * 100.0).round();
    if minor < 1.0 {
        return Err(AppError::Validation(
            "Amount must be at least one minor currency unit".to_string(),
        ));
    }
    if minor > i64::MAX as f64 {
        return Err(AppError::Validation("Amount is out of range".to_string()));
    }

    Ok(minor as i64)
}

/// Receipts correlate an order with a human conversation, nothing more.
/// Derived from the creation time; NOT unique across client retries.
fn make_receipt(now: DateTime<Utc>) -> String {
    format!("rcpt_{}", now.timestamp_millis())
}

/// Stable key for "the same user buying the same cart right now": SHA-256
/// over user id, minor-unit amount, and a five-minute time bucket.
pub fn derive_idempotency_key(user_id: &str, amount: i64, now: DateTime<Utc>) -> String {
    let bucket = now.timestamp() / IDEMPOTENCY_BUCKET_SECS;

    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(amount.to_be_bytes());
    hasher.update(b"|");
    hasher.update(bucket.to_be_bytes());

    hex::encode(hasher.finalize())
}

/// Pure merge of the two collections. Records may legitimately exist in one
/// table and not the other after a partial failure; when both exist, the
/// richer payment record wins.
pub fn merge_history(
    orders: Vec<Order>,
    records: Vec<PaymentRecord>,
) -> Vec<OrderHistoryEntry> {
    let mut entries: Vec<OrderHistoryEntry> = Vec::with_capacity(orders.len() + records.len());
    let record_ids: std::collections::HashSet<String> =
        records.iter().map(|r| r.order_id.clone()).collect();

    entries.extend(records.into_iter().map(OrderHistoryEntry::from));
    entries.extend(
        orders
            .into_iter()
            .filter(|o| !record_ids.contains(&o.order_id))
            .map(OrderHistoryEntry::from),
    );

    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Config, DatabaseConfig, RateLimitConfig, SecurityConfig, ServerConfig,
    };
    use crate::models::{OrderStatus, PaymentStatus};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn test_config(max_retries: u32) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
                max_connections: 1,
            },
            razorpay: RazorpayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: "rzp_test_secret".to_string(),
                webhook_secret: "whsec_test".to_string(),
                currency: "INR".to_string(),
            },
            retry: RetryConfig {
                max_retries,
                base_delay_ms: 1,
            },
            rate_limit: RateLimitConfig {
                requests_per_second: 100,
                burst_size: 200,
            },
            security: SecurityConfig {
                api_key_hash_secret: "hash_secret".to_string(),
            },
        }
    }

    /// Scripted gateway: pops one canned response per attempt and counts
    /// every call.
    struct FakeGateway {
        attempts: AtomicU32,
        script: Mutex<Vec<Result<RazorpayOrder, GatewayError>>>,
    }

    impl FakeGateway {
        fn new(script: Vec<Result<RazorpayOrder, GatewayError>>) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                script: Mutex::new(script),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrderGateway for FakeGateway {
        async fn create_order(
            &self,
            _request: &CreateOrderRequest,
        ) -> Result<RazorpayOrder, GatewayError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .expect("fake gateway script exhausted")
        }

        async fn ping(&self) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn ok_order() -> Result<RazorpayOrder, GatewayError> {
        Ok(RazorpayOrder {
            id: "order_abc".to_string(),
            entity: "order".to_string(),
            amount: 49999,
            amount_paid: 0,
            amount_due: 49999,
            currency: "INR".to_string(),
            receipt: Some("rcpt_1".to_string()),
            status: "created".to_string(),
            attempts: 0,
            notes: None,
            created_at: 0,
        })
    }

    fn transient() -> Result<RazorpayOrder, GatewayError> {
        Err(GatewayError::Api {
            status: 500,
            code: "SERVER_ERROR".to_string(),
            description: "momentary overload".to_string(),
        })
    }

    fn permanent() -> Result<RazorpayOrder, GatewayError> {
        Err(GatewayError::Api {
            status: 401,
            code: "BAD_REQUEST_ERROR".to_string(),
            description: "bad credentials".to_string(),
        })
    }

    fn service(max_retries: u32, gateway: Arc<FakeGateway>) -> CheckoutService {
        CheckoutService::new(&test_config(max_retries), gateway)
    }

    // --- amount conversion ---

    #[test]
    fn converts_major_units_to_minor() {
        assert_eq!(to_minor_units(499.99).unwrap(), 49999);
        assert_eq!(to_minor_units(1.0).unwrap(), 100);
        assert_eq!(to_minor_units(0.01).unwrap(), 1);
        assert_eq!(to_minor_units(1234.56).unwrap(), 123456);
    }

    #[test]
    fn rejects_non_positive_and_non_finite_amounts() {
        assert!(to_minor_units(-5.0).is_err());
        assert!(to_minor_units(0.0).is_err());
        assert!(to_minor_units(f64::NAN).is_err());
        assert!(to_minor_units(f64::INFINITY).is_err());
        // Rounds to zero minor units.
        assert!(to_minor_units(0.001).is_err());
    }

    #[test]
    fn invalid_amount_never_builds_a_gateway_request() {
        let gateway = Arc::new(FakeGateway::new(vec![]));
        let svc = service(3, gateway.clone());

        let err = svc
            .build_order_request(-5.0, "user_1", "u@example.com")
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(gateway.attempts(), 0);
    }

    #[test]
    fn order_request_carries_currency_and_notes() {
        let gateway = Arc::new(FakeGateway::new(vec![]));
        let svc = service(3, gateway);

        let request = svc
            .build_order_request(499.99, "user_1", "u@example.com")
            .unwrap();

        assert_eq!(request.amount, 49999);
        assert_eq!(request.currency, "INR");
        let notes = request.notes.unwrap();
        assert_eq!(notes["user_id"], "user_1");
        assert_eq!(notes["email"], "u@example.com");
        assert!(request.receipt.unwrap().starts_with("rcpt_"));
    }

    // --- retry policy ---

    #[tokio::test(start_paused = true)]
    async fn retries_exactly_max_retries_then_fails() {
        let gateway = Arc::new(FakeGateway::new(vec![
            transient(),
            transient(),
            transient(),
            transient(),
        ]));
        let svc = service(3, gateway.clone());
        let request = svc
            .build_order_request(10.0, "user_1", "u@example.com")
            .unwrap();

        let err = svc.create_gateway_order(&request).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(gateway.attempts(), 4); // max_retries + 1
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_stops_retrying() {
        let gateway = Arc::new(FakeGateway::new(vec![permanent(), transient()]));
        let svc = service(3, gateway.clone());
        let request = svc
            .build_order_request(10.0, "user_1", "u@example.com")
            .unwrap();

        // Script pops from the back: the permanent error arrives second, but
        // the first (transient) attempt retries once and then hits it.
        let err = svc.create_gateway_order(&request).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(gateway.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_first_means_single_attempt() {
        let gateway = Arc::new(FakeGateway::new(vec![permanent()]));
        let svc = service(3, gateway.clone());
        let request = svc
            .build_order_request(10.0, "user_1", "u@example.com")
            .unwrap();

        let err = svc.create_gateway_order(&request).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(gateway.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        // Two transient failures, then success on the third attempt.
        let gateway = Arc::new(FakeGateway::new(vec![
            ok_order(),
            transient(),
            transient(),
        ]));
        let svc = service(3, gateway.clone());
        let request = svc
            .build_order_request(499.99, "user_1", "u@example.com")
            .unwrap();

        let order = svc.create_gateway_order(&request).await.unwrap();

        assert_eq!(order.id, "order_abc");
        assert_eq!(order.amount, 49999);
        assert_eq!(gateway.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_not_retried() {
        let gateway = Arc::new(FakeGateway::new(vec![Err(
            GatewayError::InvalidResponse("mangled body".to_string()),
        )]));
        let svc = service(3, gateway.clone());
        let request = svc
            .build_order_request(10.0, "user_1", "u@example.com")
            .unwrap();

        svc.create_gateway_order(&request).await.unwrap_err();

        assert_eq!(gateway.attempts(), 1);
    }

    #[tokio::test]
    async fn recovers_over_http_after_transient_gateway_errors() {
        use crate::services::razorpay::RazorpayClient;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        // Two transient classifications, then a successful order.
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": { "code": "SERVER_ERROR", "description": "overloaded" }
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "order_abc",
                "amount": 49999,
                "currency": "INR",
                "receipt": "rcpt_1",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(3);
        let client = RazorpayClient::with_base_url(&config.razorpay, server.uri());
        let svc = CheckoutService::new(&config, Arc::new(client));

        let request = svc
            .build_order_request(499.99, "user_1", "u@example.com")
            .unwrap();
        let order = svc.create_gateway_order(&request).await.unwrap();

        assert_eq!(order.id, "order_abc");
        assert_eq!(order.amount, 49999);
    }

    // --- idempotency key ---

    #[test]
    fn idempotency_key_is_stable_within_a_bucket() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 30).unwrap();
        let t_same_bucket = Utc.with_ymd_and_hms(2024, 6, 1, 12, 4, 59).unwrap();
        let t_next_bucket = Utc.with_ymd_and_hms(2024, 6, 1, 12, 5, 1).unwrap();

        let a = derive_idempotency_key("user_1", 49999, t);
        assert_eq!(a, derive_idempotency_key("user_1", 49999, t_same_bucket));
        assert_ne!(a, derive_idempotency_key("user_1", 49999, t_next_bucket));
        assert_ne!(a, derive_idempotency_key("user_2", 49999, t));
        assert_ne!(a, derive_idempotency_key("user_1", 50000, t));
    }

    // --- history merge ---

    fn order_row(order_id: &str, ts: i64) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_id: order_id.to_string(),
            amount: 1000,
            currency: "INR".to_string(),
            receipt: "rcpt_1".to_string(),
            notes: None,
            status: OrderStatus::Created,
            user_id: Some("user_1".to_string()),
            customer_email: None,
            payment_id: None,
            signature: None,
            idempotency_key: None,
            completed_at: None,
            created_at: Utc.timestamp_opt(ts, 0).unwrap(),
            updated_at: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    fn record_row(order_id: &str, ts: i64) -> PaymentRecord {
        PaymentRecord {
            order_id: order_id.to_string(),
            payment_id: format!("pay_{}", order_id),
            signature: "sig".to_string(),
            amount: 1000,
            currency: "INR".to_string(),
            total_amount: 1000,
            items: sqlx::types::Json(vec![]),
            user_id: Some("user_1".to_string()),
            customer: None,
            status: OrderStatus::Completed,
            payment_status: PaymentStatus::Paid,
            fulfillment_status: crate::models::FulfillmentStatus::Unfulfilled,
            payment_date: Utc.timestamp_opt(ts, 0).unwrap(),
            created_at: Utc.timestamp_opt(ts, 0).unwrap(),
            updated_at: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    #[test]
    fn merge_deduplicates_by_order_id() {
        let orders = vec![order_row("order_a", 100), order_row("order_b", 200)];
        let records = vec![record_row("order_a", 150)];

        let merged = merge_history(orders, records);

        assert_eq!(merged.len(), 2);
        let a: Vec<_> = merged.iter().filter(|e| e.order_id == "order_a").collect();
        assert_eq!(a.len(), 1);
        // The payment record wins: it carries the payment id.
        assert!(a[0].payment_id.is_some());
    }

    #[test]
    fn merge_orders_newest_first() {
        let orders = vec![order_row("order_old", 100)];
        let records = vec![record_row("order_new", 300), record_row("order_mid", 200)];

        let merged = merge_history(orders, records);

        let ids: Vec<_> = merged.iter().map(|e| e.order_id.as_str()).collect();
        assert_eq!(ids, vec!["order_new", "order_mid", "order_old"]);
    }

    #[test]
    fn merge_keeps_entries_present_in_only_one_collection() {
        // Partial failure: order row written, backup record lost - and the
        // reverse. Both still show up exactly once.
        let merged = merge_history(
            vec![order_row("order_only", 100)],
            vec![record_row("record_only", 200)],
        );

        assert_eq!(merged.len(), 2);
    }
}
