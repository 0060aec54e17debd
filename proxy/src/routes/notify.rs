use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tracing::{error, warn};

use crate::error::ProxyError;
use crate::middleware::client_ip::caller_identity;
use crate::middleware::rate_limit::rate_limit_key;
use crate::notify::NotificationRequest;
use crate::routes::parse_body;
use crate::AppState;

pub const NOTIFY_OPERATION: &str = "notify";

/// POST /sendNotification
pub async fn send_notification(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ProxyError> {
    let caller = caller_identity(peer.as_ref(), &headers, state.trust_forwarded_for);

    if !state
        .rate_limiter
        .check(&rate_limit_key(NOTIFY_OPERATION, &caller), state.notify_budget)
    {
        warn!("Rate limited caller {} on {}", caller, NOTIFY_OPERATION);
        return Err(ProxyError::RateLimited);
    }

    let req: NotificationRequest = parse_body(&body)?;
    let platform = state.notifier.send(req).await.map_err(|e| {
        match e {
            ProxyError::Unexpected(_) | ProxyError::Configuration(_) => {
                error!("Notification error: {}", e)
            }
            _ => warn!("Notification from {} not delivered: {}", caller, e),
        }
        e
    })?;

    Ok(Json(json!({
        "success": true,
        "platform": platform.as_str()
    })))
}
