use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use std::time::Duration;

use crate::api::handlers;
use crate::api::middleware::{api_key_auth, identity_context, ip_rate_limit, request_logging};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/status", get(handlers::service_status));

    // Webhook routes (signature verification instead of API key)
    let webhook_routes = Router::new()
        .route("/webhooks/razorpay", post(handlers::razorpay_webhook));

    // Checkout routes
    let checkout_routes = Router::new()
        .route(
            "/orders",
            post(handlers::create_order).get(handlers::list_orders),
        )
        .route("/orders/:order_id", get(handlers::get_order))
        .route("/verify", post(handlers::verify_payment))
        .route("/payments", post(handlers::record_payment))
        .route(
            "/payments/:order_id/fulfillment",
            patch(handlers::update_fulfillment),
        );

    // Protected API routes
    let api_routes = Router::new()
        .nest("/checkout", checkout_routes)
        .layer(middleware::from_fn(identity_context))
        .layer(middleware::from_fn_with_state(state.clone(), api_key_auth))
        .layer(middleware::from_fn_with_state(state.clone(), ip_rate_limit));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        .nest("/api/v1", api_routes)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}
