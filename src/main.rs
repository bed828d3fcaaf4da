//! PlanSync realtime service entry point.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use plansync::adapters::auth::JwtAuthProvider;
use plansync::adapters::websocket::{websocket_router, WsState};
use plansync::config::AppConfig;
use plansync::ports::NoopEventSink;
use plansync::realtime::{spawn_idle_sweeper, CoreStats, MessagingCore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config);

    let secret = if config.auth.jwt_secret.is_empty() {
        tracing::warn!("No JWT secret configured; using an insecure development secret");
        "insecure-dev-secret".to_string()
    } else {
        config.auth.jwt_secret.clone()
    };
    let auth = Arc::new(JwtAuthProvider::new(
        &secret,
        config.auth.allowed_origins_list(),
    ));

    let core = Arc::new(MessagingCore::new(
        config.realtime.clone(),
        auth,
        Arc::new(NoopEventSink),
    ));

    // Cleanup runs from process start, not lazily from the first connect.
    let sweep_interval = Duration::from_secs(config.realtime.sweep_interval_secs);
    spawn_idle_sweeper(Arc::clone(&core), sweep_interval);

    let app = Router::new()
        .merge(websocket_router())
        .route("/health", get(health))
        .with_state(WsState::new(core))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "PlanSync realtime service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(state): State<WsState>) -> Json<CoreStats> {
    Json(state.core.stats().await)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.is_production() {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| match origin.parse::<http::HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_origin(origins)
    }
}
