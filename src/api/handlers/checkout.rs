use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::middleware::CallerIdentity;
use crate::db::repositories::{NewPaymentRecord, OrderRepository, PaymentRecordRepository};
use crate::error::{AppError, AppResult};
use crate::models::{
    CustomerDetails, FulfillmentStatus, OrderHistoryEntry, OrderItem, OrderResponse,
    PaymentRecord, PaymentStatus,
};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    /// Major currency units (rupees). Conversion to minor units and the
    /// positivity check happen before any gateway call.
    pub amount: f64,
    #[serde(default)]
    #[validate(length(min = 8, max = 128, message = "Invalid idempotency key"))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order_id: String,
    /// Minor units, exactly as the gateway returned them. The client hands
    /// this to the hosted checkout UI without recomputation.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    /// Publishable key id the hosted UI is initialized with.
    pub key_id: String,
}

pub async fn create_order(
    State(state): State<AppState>,
    identity: Option<Extension<CallerIdentity>>,
    Json(request): Json<CreateOrderRequest>,
) -> AppResult<Json<CreateOrderResponse>> {
    request
        .validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;

    let Extension(identity) = identity.ok_or_else(|| {
        AppError::Authentication("Caller identity is required to create an order".to_string())
    })?;

    let order = state
        .checkout
        .create_order(
            &state.db,
            request.amount,
            &identity.user_id,
            &identity.email,
            request.idempotency_key,
        )
        .await?;

    tracing::info!(
        order_id = %order.order_id,
        user_id = %identity.user_id,
        amount = order.amount,
        "Checkout order created"
    );

    Ok(Json(CreateOrderResponse {
        success: true,
        order_id: order.order_id,
        amount: order.amount,
        currency: order.currency,
        receipt: order.receipt,
        key_id: state.checkout.key_id().to_string(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub verified: bool,
}

/// Verifies the checkout callback signature. A mismatch answers
/// `verified: false`; only malformed input or internal failures error, and
/// internal failures always count as "not verified" (fail-closed).
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> AppResult<Json<VerifyPaymentResponse>> {
    request
        .validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;

    let verified = state
        .checkout
        .verify_payment(
            &state.db,
            &request.razorpay_order_id,
            &request.razorpay_payment_id,
            &request.razorpay_signature,
        )
        .await?;

    Ok(Json(VerifyPaymentResponse {
        success: true,
        verified,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,
    #[validate(range(min = 1, message = "amount must be positive"))]
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[validate(range(min = 1, message = "total_amount must be positive"))]
    pub total_amount: i64,
    #[validate(length(min = 1, message = "items must not be empty"))]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub customer: Option<CustomerDetails>,
    #[serde(default)]
    pub payment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct RecordPaymentResponse {
    pub success: bool,
    pub order_id: String,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
}

/// The client's best-effort backup write, fired as soon as the gateway
/// callback delivers identifiers - before verification is relied upon.
/// Guest checkouts are allowed: the record is stored without a user id.
pub async fn record_payment(
    State(state): State<AppState>,
    identity: Option<Extension<CallerIdentity>>,
    Json(request): Json<RecordPaymentRequest>,
) -> AppResult<Json<RecordPaymentResponse>> {
    request
        .validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;

    let record = NewPaymentRecord {
        order_id: request.razorpay_order_id,
        payment_id: request.razorpay_payment_id,
        signature: request.razorpay_signature,
        amount: request.amount,
        currency: request
            .currency
            .unwrap_or_else(|| state.config.razorpay.currency.clone()),
        total_amount: request.total_amount,
        items: request.items,
        user_id: identity.map(|Extension(i)| i.user_id),
        customer: request.customer,
        payment_date: request.payment_date.unwrap_or_else(Utc::now),
    };

    let stored = state.checkout.record_payment(&state.db, &record).await?;

    Ok(Json(RecordPaymentResponse {
        success: true,
        order_id: stored.order_id,
        payment_status: stored.payment_status,
        fulfillment_status: stored.fulfillment_status,
    }))
}

#[derive(Debug, Serialize)]
pub struct GetOrderResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_record: Option<PaymentRecord>,
}

/// Looks up by gateway order id across both collections: the order row, the
/// backup payment record, or both (partial failures leave either one alone).
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> AppResult<Json<GetOrderResponse>> {
    let order = OrderRepository::find_by_order_id(&state.db, &order_id).await?;
    let record = PaymentRecordRepository::find(&state.db, &order_id).await?;

    if order.is_none() && record.is_none() {
        return Err(AppError::NotFound(format!("Order {} not found", order_id)));
    }

    Ok(Json(GetOrderResponse {
        success: true,
        order: order.map(OrderResponse::from),
        payment_record: record,
    }))
}

#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub success: bool,
    pub orders: Vec<OrderHistoryEntry>,
}

/// Merged order history for the authenticated caller, newest first,
/// de-duplicated by gateway order id.
pub async fn list_orders(
    State(state): State<AppState>,
    identity: Option<Extension<CallerIdentity>>,
) -> AppResult<Json<ListOrdersResponse>> {
    let Extension(identity) = identity.ok_or_else(|| {
        AppError::Authentication("Caller identity is required to list orders".to_string())
    })?;

    let orders = state
        .checkout
        .order_history(&state.db, &identity.user_id)
        .await?;

    Ok(Json(ListOrdersResponse {
        success: true,
        orders,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateFulfillmentRequest {
    pub fulfillment_status: FulfillmentStatus,
}

#[derive(Debug, Serialize)]
pub struct UpdateFulfillmentResponse {
    pub success: bool,
    pub order_id: String,
    pub fulfillment_status: FulfillmentStatus,
}

/// Back-office correction of the fulfillment lifecycle. Routed behind the
/// secret-key requirement in the auth middleware.
pub async fn update_fulfillment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(request): Json<UpdateFulfillmentRequest>,
) -> AppResult<Json<UpdateFulfillmentResponse>> {
    let record = PaymentRecordRepository::update_fulfillment(
        &state.db,
        &order_id,
        request.fulfillment_status,
    )
    .await?;

    tracing::info!(
        order_id = %record.order_id,
        fulfillment_status = ?record.fulfillment_status,
        "Fulfillment status updated"
    );

    Ok(Json(UpdateFulfillmentResponse {
        success: true,
        order_id: record.order_id,
        fulfillment_status: record.fulfillment_status,
    }))
}
