pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;

use api::middleware::IpRateLimiter;
use config::Config;
use services::CheckoutService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<PgPool>,
    pub checkout: Arc<CheckoutService>,
    pub rate_limiter: Arc<IpRateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: PgPool, checkout: CheckoutService) -> Self {
        let rate_limiter = IpRateLimiter::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst_size,
        );

        Self {
            config: Arc::new(config),
            db: Arc::new(db),
            checkout: Arc::new(checkout),
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}
