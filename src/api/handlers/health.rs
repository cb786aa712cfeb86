use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::AppResult;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceStatus,
}

#[derive(Serialize)]
pub struct ServiceStatus {
    pub database: bool,
    pub razorpay: bool,
}

pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let db_status = if crate::db::ping(&state.db).await {
        "connected"
    } else {
        "disconnected"
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status.to_string(),
    }))
}

/// Deeper probe: database plus an on-demand gateway connectivity check.
/// This replaces the startup-time gateway self-test; operators hit it when
/// they want the answer, instead of reading one stale log line from boot.
pub async fn service_status(State(state): State<AppState>) -> AppResult<Json<StatusResponse>> {
    let db_ok = crate::db::ping(&state.db).await;
    let gateway_ok = state.checkout.gateway_healthy().await;

    let services = ServiceStatus {
        database: db_ok,
        razorpay: gateway_ok,
    };

    Ok(Json(StatusResponse {
        status: if db_ok && gateway_ok { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services,
    }))
}
