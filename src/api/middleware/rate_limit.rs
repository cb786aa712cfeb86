use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

use crate::error::AppError;
use crate::AppState;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token-bucket limiter, one bucket per client address.
pub struct IpRateLimiter {
    limiters: DashMap<IpAddr, Arc<DirectLimiter>>,
    quota: Quota,
}

impl IpRateLimiter {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second.max(1)).expect("non-zero rate"),
        )
        .allow_burst(NonZeroU32::new(burst_size.max(1)).expect("non-zero burst"));

        Self {
            limiters: DashMap::new(),
            quota,
        }
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        let limiter = self
            .limiters
            .entry(ip)
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone();

        limiter.check().is_ok()
    }
}

/// Per-IP rate limiting for the API surface. Health probes bypass it.
pub async fn ip_rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    if state.rate_limiter.check(addr.ip()) {
        next.run(request).await
    } else {
        tracing::warn!(
            ip = %addr.ip(),
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        AppError::RateLimitExceeded.into_response()
    }
}
