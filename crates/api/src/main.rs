//! # Read API Server
//!
//! Serves the stored shortlist and pipeline state over HTTP:
//!
//! - `GET /shortlist`: ranked opportunities from the active snapshot
//! - `GET /shortlist/export`: CSV with the same filter surface
//! - `GET /pipeline/status`: latest run summary
//! - `POST /pipeline/run`: trigger a new run, returns its id
//! - `GET /health`, `GET /ready`: probes
//! - Swagger UI at `/swagger-ui`
//!
//! The server never exposes a degraded or failed run's proposed shortlist;
//! freeze semantics are enforced at the store layer.

use axum::{http::StatusCode, response::IntoResponse, Json, Router};
use nicheradar_core::{Config, DatabasePool};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod error;
mod handlers;
mod health;
mod state;

use crate::handlers::{pipeline, shortlist};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness_check,
        shortlist::get_shortlist,
        shortlist::export_shortlist,
        pipeline::pipeline_status,
        pipeline::trigger_run,
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "shortlist", description = "Ranked opportunity shortlist"),
        (name = "pipeline", description = "Pipeline status and control"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting nicheradar API server");
    let config = Config::load()?;
    let db = DatabasePool::new(&config.database).await?;
    db.run_migrations().await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(config, db);
    let app = create_app(state);

    info!("Server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/shortlist", axum::routing::get(shortlist::get_shortlist))
        .route(
            "/shortlist/export",
            axum::routing::get(shortlist::export_shortlist),
        )
        .route(
            "/pipeline/status",
            axum::routing::get(pipeline::pipeline_status),
        )
        .route("/pipeline/run", axum::routing::post(pipeline::trigger_run))
        .route("/health", axum::routing::get(health::health_check))
        .route("/ready", axum::routing::get(health::readiness_check))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
        .fallback(handler_404)
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Resource not found"})),
    )
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "nicheradar_api=debug,nicheradar_market_data=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
