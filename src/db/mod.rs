pub mod pool;
pub mod repositories;

pub use pool::{create_pool, ping, run_migrations, DbPool};
