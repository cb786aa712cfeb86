use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    /// Operating currency of the storefront. Orders are always minted in
    /// this currency; the client never chooses it.
    pub currency: String,
}

/// Backoff knobs for the Order Creator's gateway call.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub api_key_hash_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("razorpay.currency", "INR")?
            .set_default("retry.max_retries", 3)?
            .set_default("retry.base_delay_ms", 1000)?
            .set_default("rate_limit.requests_per_second", 100)?
            .set_default("rate_limit.burst_size", 200)?
            .add_source(config::Environment::default().separator("_").try_parsing(true))
            .build()?;

        // Manual construction due to environment variable naming
        Ok(Config {
            server: ServerConfig {
                host: config.get_string("host").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: config.get_int("port").unwrap_or(8080) as u16,
            },
            database: DatabaseConfig {
                url: config.get_string("database.url")?,
                max_connections: config.get_int("database.max_connections").unwrap_or(10) as u32,
            },
            razorpay: RazorpayConfig {
                key_id: config.get_string("razorpay.key.id")?,
                key_secret: config.get_string("razorpay.key.secret")?,
                webhook_secret: config.get_string("razorpay.webhook.secret")?,
                currency: config
                    .get_string("razorpay.currency")
                    .unwrap_or_else(|_| "INR".to_string()),
            },
            retry: RetryConfig {
                max_retries: config.get_int("retry.max.retries").unwrap_or(3) as u32,
                base_delay_ms: config.get_int("retry.base.delay.ms").unwrap_or(1000) as u64,
            },
            rate_limit: RateLimitConfig {
                requests_per_second: config.get_int("rate.limit.requests.per.second").unwrap_or(100) as u32,
                burst_size: config.get_int("rate.limit.burst.size").unwrap_or(200) as u32,
            },
            security: SecurityConfig {
                api_key_hash_secret: config.get_string("api.key.hash.secret")?,
            },
        })
    }
}

pub type SharedConfig = Arc<Config>;
