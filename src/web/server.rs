use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::adapter::Adapter;
use crate::config::Config;

use super::api::guide as guide_handlers;
use super::api::platform as platform_handlers;
use super::api_doc::ApiDoc;
use super::auth::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Platform control
        .route("/api/platform/status", get(platform_handlers::status))
        .route("/api/platform/position", get(platform_handlers::position))
        .route("/api/platform/start", post(platform_handlers::start))
        .route("/api/platform/pause", post(platform_handlers::pause))
        .route("/api/platform/resume", post(platform_handlers::resume))
        .route("/api/platform/reset", post(platform_handlers::reset))
        .route("/api/platform/stroke", put(platform_handlers::set_stroke))
        .route("/api/platform/sync", post(platform_handlers::sync))
        // Guiding
        .route("/api/guide/pulse", post(guide_handlers::pulse))
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the control API until the listener fails. The server holds one
/// client session for its whole lifetime.
pub async fn run_server(config: Config, adapter: Arc<Adapter>) -> std::io::Result<()> {
    let bind_addr = config.web.bind.clone();
    let watchdog_interval = config.guide.watchdog_interval;

    let session = adapter.connect().map_err(std::io::Error::other)?;
    log::info!("{}", session.adapter().status());

    tokio::spawn(watch_stroke(adapter.clone(), watchdog_interval));

    let state = AppState {
        config: Arc::new(config),
        adapter,
    };
    let app = router(state);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let served = axum::serve(listener, app).await;
    drop(session);
    served
}

/// Pauses the platform when the stroke runs out.
async fn watch_stroke(adapter: Arc<Adapter>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let adapter = adapter.clone();
        match tokio::task::spawn_blocking(move || adapter.pause_if_exhausted()).await {
            Ok(Ok(true)) => log::info!("Stroke exhausted, platform paused"),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => log::warn!("Stroke watchdog could not pause platform: {}", e),
            Err(e) => log::error!("Stroke watchdog task failed: {}", e),
        }
    }
}
