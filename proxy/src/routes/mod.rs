pub mod health;
pub mod notify;
pub mod proxy;
pub mod stream;

use axum::body::Bytes;
use axum::routing::{get, post};
use axum::Router;
use serde::de::DeserializeOwned;
use tower_http::cors::{Any, CorsLayer};

use crate::error::ProxyError;
use crate::AppState;

/// Build the HTTP surface around shared state.
pub fn router(state: AppState) -> Router {
    // CORS layer: allow requests from any origin (browser SPA calls these directly)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health::health))
        .route("/blofinProxy", post(proxy::blofin_proxy))
        .route("/sendNotification", post(notify::send_notification))
        .route(
            "/blofinWebSocket",
            get(stream::stream_status).post(stream::stream_status),
        )
        .layer(cors)
        .with_state(state)
}

/// Decode a JSON request body. An empty body decodes to `T::default()` so the
/// handler reports the missing field rather than a parse error.
pub(crate) fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ProxyError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ProxyError::validation(format!("Invalid JSON body: {e}")))
}
