use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

/// GET /api/health
///
/// Reports the server version and which upstream integrations have their
/// credentials loaded. Never echoes credential values.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "exchange_configured": state.blofin.has_credentials(),
        "notify_platforms": state
            .notifier
            .configured_platforms()
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>(),
        "rate_limit_keys": state.rate_limiter.tracked_keys(),
    }))
}
