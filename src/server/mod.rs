pub mod api;

use crate::models::EnrichedStock;
use crate::services::{AggregationPipeline, PriceLookupService, SharedMetrics, SnapshotCache};
use axum::{extract::FromRef, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

pub type SharedSnapshot = Arc<SnapshotCache<Vec<EnrichedStock>>>;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub snapshot: SharedSnapshot,
    pub pipeline: Arc<AggregationPipeline>,
    pub quotes: Arc<PriceLookupService>,
    pub metrics: SharedMetrics,
    pub started_at: Instant,
}

impl FromRef<AppState> for SharedMetrics {
    fn from_ref(app_state: &AppState) -> SharedMetrics {
        app_state.metrics.clone()
    }
}

impl FromRef<AppState> for SharedSnapshot {
    fn from_ref(app_state: &AppState) -> SharedSnapshot {
        app_state.snapshot.clone()
    }
}

/// Start the axum server
pub async fn serve(app_state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting pickstream server");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers(Any);

    tracing::info!("Registering routes:");
    tracing::info!("  GET /picks?limit=10&page=1&tag=ai&market=NASDAQ&sentiment=positive");
    tracing::info!("  GET /health");
    tracing::info!("  GET /metrics");

    let app = Router::new()
        .route("/picks", get(api::get_picks_handler))
        .route("/health", get(api::health_handler))
        .route("/metrics", get(api::metrics_handler))
        .layer(cors)
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
