use axum::Json;
use serde_json::{json, Value};

/// GET|POST /blofinWebSocket
///
/// Placeholder for the real-time channel. Reports readiness only; no stream
/// is opened.
pub async fn stream_status() -> Json<Value> {
    Json(json!({
        "status": "WebSocket handler ready",
        "message": "Real-time data streaming available"
    }))
}
