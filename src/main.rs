use std::sync::Arc;

use dotenvy::dotenv;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use agrirent::api_router::configure_api_routes;
use agrirent::config::AppConfig;
use agrirent::payments::razorpay::RazorpayClient;
use agrirent::shared::state::AppState;
use agrirent::shared::utils::{create_conn, run_migrations};
use agrirent::store::pg::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agrirent=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    let pool = create_conn(&config.database_url())?;
    run_migrations(&pool)?;
    let store = Arc::new(PgStore::new(pool));
    let gateway = Arc::new(RazorpayClient::new(
        config.gateway.key_id.clone(),
        config.gateway.key_secret.clone(),
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, store, gateway));

    let app = axum::Router::new()
        .nest("/api", configure_api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
