use atro_config::CorsConfig;
use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    AppState,
    handlers::{health_handler, status_handler, websocket_handler},
};

pub const WEBSOCKET_PATH: &str = "/ws";
pub const HEALTH_PATH: &str = "/health";
pub const STATUS_PATH: &str = "/api/status";

pub fn create_app(state: AppState) -> Router {
    let cors_layer = cors_layer(&state.config.cors);

    Router::new()
        .route(WEBSOCKET_PATH, get(websocket_handler))
        .route(HEALTH_PATH, get(health_handler))
        .route(STATUS_PATH, get(status_handler))
        // Outermost first: CORS, then tracing.
        .layer(
            ServiceBuilder::new()
                .layer(cors_layer)
                .map_response(|res: axum::response::Response<_>| res.map(axum::body::Body::new))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

/// Allow-list from config; an empty list or `*` allows any origin.
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect();
    let allow_origin = if origins.is_empty() || config.is_wildcard_included() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET])
        .allow_headers(Any)
}
