use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use token_broker::{
    config::Config,
    handlers,
    services,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    let app = handlers::broker::router(state.clone());

    let cleanup_state = state.clone();
    let cleanup_interval = config.session_cleanup_interval;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(cleanup_interval).await;
            tracing::info!("🧹 Running scheduled cleanup of expired sessions...");
            match services::session::cleanup_expired_sessions(&cleanup_state).await {
                Ok(_) => {
                    tracing::info!("✅ Cleanup job completed successfully");
                }
                Err(e) => {
                    tracing::error!("❌ Cleanup job failed: {}", e);
                }
            }
        }
    });

    let addr = config.server_addr;
    tracing::info!("🚀 Token broker listening on http://{}", addr);
    tracing::info!("✅ Background cleanup job started (every {:?})", cleanup_interval);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
