// Travel Recommender Server - hybrid feed recommendations over HTTP

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use travel_recommender::{
    app_state::AppState,
    config::Config,
    recommendation_interface::create_recommendation_router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let app_state = AppState::new(config.clone()).await?;
    let _refresh = app_state.start_background_refresh().await?;

    let recommendation_router = create_recommendation_router(app_state.recommendation_interface.clone());

    // Build main application router
    let app = Router::new()
        .nest("/api/v1", recommendation_router)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = config.server_address();
    info!("Travel recommender starting on http://{}", addr);
    info!("  GET  /api/v1/users/{{id}}/recommendations?limit&exclude");
    info!("  GET  /api/v1/users/{{id}}/recommendation-stats");
    info!("  GET  /api/v1/users/{{id}}/suggested-follows?limit");
    info!("  GET  /api/v1/feed/popular?limit");
    info!("  GET  /api/v1/posts/{{id}}/similar?limit");
    info!("  POST /api/v1/interactions");
    info!("  POST /api/v1/snapshot/invalidate");
    info!("  GET  /api/v1/metrics");

    let listener = TcpListener::bind(addr.as_str()).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
