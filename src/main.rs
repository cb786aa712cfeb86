use std::net::SocketAddr;
use std::sync::Arc;

use storefront_checkout::{
    api::create_router,
    api::middleware::init_tracing,
    config::Config,
    db::{create_pool, run_migrations},
    services::razorpay::RazorpayClient,
    services::CheckoutService,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    tracing::info!("Starting Storefront Checkout API v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing::info!("Configuration loaded successfully");

    // Create database connection pool
    let db_pool = create_pool(&config.database).await?;

    tracing::info!("Database connection pool created");

    // Run migrations
    run_migrations(&db_pool).await?;

    tracing::info!("Database migrations completed");

    // The gateway client is constructed once here and injected; nothing else
    // reads the credentials.
    let gateway = Arc::new(RazorpayClient::new(&config.razorpay));
    let checkout = CheckoutService::new(&config, gateway);

    tracing::info!("Checkout service initialized");

    // Create application state
    let state = AppState::new(config.clone(), (*db_pool).clone(), checkout);

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Storefront Checkout API is ready to accept connections");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
