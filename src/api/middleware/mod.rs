pub mod auth;
pub mod logging;
pub mod rate_limit;

pub use auth::{api_key_auth, identity_context, CallerIdentity};
pub use logging::{init_tracing, init_tracing_dev, request_logging};
pub use rate_limit::{ip_rate_limit, IpRateLimiter};
