// HTTP routes for `serve`

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::store::DocumentStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) config: AppConfig,
}

pub fn app(store: Arc<dyn DocumentStore>, config: AppConfig) -> Router {
    let state = AppState { store, config };
    Router::new()
        .route("/", get(|| async { "sensor-ops readings API" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/readings", get(http::readings_handler)) // GET /api/readings?limit=N
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
