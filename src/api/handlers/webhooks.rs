use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::repositories::OrderRepository;
use crate::error::{AppError, AppResult};
use crate::services::razorpay::SignatureVerifier;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RazorpayWebhookPayload {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayloadBody,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayloadBody {
    #[serde(default)]
    pub payment: Option<WebhookPaymentEntity>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPaymentEntity {
    pub entity: WebhookPayment,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayment {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Gateway-initiated payment events. The signature covers the raw body with
/// the dedicated webhook secret; an unsigned or mis-signed delivery is
/// rejected before the payload is even parsed. This is the path that marks
/// an order completed when the client never reports back after paying.
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookResponse>> {
    let signature = headers
        .get("X-Razorpay-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::WebhookVerification("Missing signature header".to_string())
        })?;

    let signature_valid = SignatureVerifier::verify_webhook_signature(
        &body,
        signature,
        &state.config.razorpay.webhook_secret,
    )?;

    if !signature_valid {
        return Err(AppError::WebhookVerification(
            "Invalid webhook signature".to_string(),
        ));
    }

    let webhook: RazorpayWebhookPayload = serde_json::from_slice(&body)?;

    match webhook.event.as_str() {
        "payment.captured" => {
            let payment = require_payment(&webhook)?;
            let order_id = require_order_id(payment)?;

            match OrderRepository::mark_completed(&state.db, order_id, Some(&payment.id), None)
                .await?
            {
                Some(order) => {
                    tracing::info!(
                        order_id = %order.order_id,
                        payment_id = %payment.id,
                        "Order completed via gateway webhook"
                    );
                }
                None => {
                    tracing::warn!(
                        order_id,
                        payment_id = %payment.id,
                        "Captured payment for unknown order"
                    );
                }
            }
        }
        "payment.authorized" => {
            let payment = require_payment(&webhook)?;
            let order_id = require_order_id(payment)?;

            // Funds held, not yet captured: remember the payment id but do
            // not advance the order status.
            if OrderRepository::attach_payment_id(&state.db, order_id, &payment.id)
                .await?
                .is_none()
            {
                tracing::warn!(
                    order_id,
                    payment_id = %payment.id,
                    "Authorized payment for unknown order"
                );
            } else {
                tracing::info!(order_id, payment_id = %payment.id, "Payment authorized");
            }
        }
        "payment.failed" => {
            if let Some(ref entity) = webhook.payload.payment {
                tracing::warn!(
                    payment_id = %entity.entity.id,
                    order_id = ?entity.entity.order_id,
                    status = ?entity.entity.status,
                    "Gateway reported failed payment"
                );
            }
        }
        other => {
            tracing::info!(event = other, "Unhandled webhook event");
        }
    }

    Ok(Json(WebhookResponse {
        success: true,
        message: "Webhook processed".to_string(),
    }))
}

fn require_payment(webhook: &RazorpayWebhookPayload) -> AppResult<&WebhookPayment> {
    webhook
        .payload
        .payment
        .as_ref()
        .map(|entity| &entity.entity)
        .ok_or_else(|| AppError::Validation("Webhook payload missing payment entity".to_string()))
}

fn require_order_id(payment: &WebhookPayment) -> AppResult<&str> {
    payment
        .order_id
        .as_deref()
        .ok_or_else(|| AppError::Validation("Webhook payment has no order id".to_string()))
}
