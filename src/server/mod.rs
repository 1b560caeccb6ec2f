pub mod error;
pub mod handlers;

use std::sync::Arc;

use anyhow::{Context, Error};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::config::{ServerConfig, ServiceConfig};
use crate::pipeline::pipeline::FaceLandmarkPipeline;

pub fn create_router(pipeline: FaceLandmarkPipeline, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/detect-face", post(handlers::detect_face))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(create_cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(pipeline))
}

/// Any origin when `origins` is empty, otherwise only the listed ones.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin {o:?}");
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

/// Binds the configured address and serves the API until the process stops.
pub async fn serve(config: ServiceConfig) -> Result<(), Error> {
    let pipeline = FaceLandmarkPipeline::with_triton(&config.triton);
    let app = create_router(pipeline, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("face detection API listening on {addr}, models served by {}", config.triton.url);

    axum::serve(listener, app).await?;
    Ok(())
}
