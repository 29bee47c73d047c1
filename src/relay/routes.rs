use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use super::exchange::exchange_token;
use super::server::RelayAppState;
use crate::protocol::EXCHANGE_TOKEN_PATH;
use crate::shared::time::now_unix_seconds;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    app: &'static str,
    version: &'static str,
    ts: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: "github-pkce-relay",
        version: env!("CARGO_PKG_VERSION"),
        ts: now_unix_seconds(),
    })
}

async fn root() -> &'static str {
    "GitHub PKCE relay is running"
}

/// Grants cross-origin access to the configured front-end origin only.
pub(super) fn cors_layer(frontend_origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let Some(origin) = frontend_origin else {
        return layer;
    };
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(AllowOrigin::list([value])),
        Err(err) => {
            tracing::warn!(origin, "ignoring invalid FRONTEND_URL for CORS: {err}");
            layer
        }
    }
}

pub(super) fn build_router(state: RelayAppState) -> Router {
    let cors = cors_layer(state.config.frontend_origin.as_deref());
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(EXCHANGE_TOKEN_PATH, post(exchange_token))
        .layer(cors)
        .with_state(state)
}
