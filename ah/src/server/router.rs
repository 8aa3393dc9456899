//! Router setup for the shared endpoint

use std::path::Path;

use axum::Router;
use axum::http::{Method, header};
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::{AppState, events, handlers, ui};

/// Build the API router plus UI fallback
pub fn router(state: AppState, ui_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/source", get(handlers::source))
        .route("/requests", get(handlers::list_requests).post(handlers::create_request))
        .route("/requests/:id", get(handlers::get_request))
        .route("/requests/:id/poll", get(handlers::poll_request))
        .route("/requests/:id/respond", post(handlers::respond))
        .route("/events", get(events::events))
        .fallback(api_not_found);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let router = Router::new().nest("/api", api);
    let router = match ui_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")))),
        None => router.fallback(ui::index),
    };

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn api_not_found() -> ApiError {
    ApiError::not_found("unknown API endpoint")
}
