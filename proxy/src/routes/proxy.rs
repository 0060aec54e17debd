use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;
use std::net::SocketAddr;
use tracing::{error, warn};

use crate::error::ProxyError;
use crate::exchange::ProxyRequest;
use crate::middleware::client_ip::caller_identity;
use crate::middleware::rate_limit::rate_limit_key;
use crate::routes::parse_body;
use crate::AppState;

pub const PROXY_OPERATION: &str = "blofin_api";

/// POST /blofinProxy
///
/// Rate limits the caller, validates the target endpoint, signs the call with
/// the exchange credentials and relays the exchange's JSON response.
/// The rate limit is checked and recorded before the body is even parsed.
pub async fn blofin_proxy(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ProxyError> {
    let caller = caller_identity(peer.as_ref(), &headers, state.trust_forwarded_for);

    let key = rate_limit_key(PROXY_OPERATION, &caller);
    if !state.rate_limiter.check(&key, state.proxy_budget) {
        warn!("Rate limited caller {} on {}", caller, PROXY_OPERATION);
        return Err(ProxyError::RateLimited);
    }

    let req: ProxyRequest = parse_body(&body)?;
    let call = state.blofin.prepare(req).map_err(|e| {
        warn!("Rejected proxy request from {}: {}", caller, e);
        e
    })?;

    let data = state.blofin.forward(&call).await.map_err(|e| {
        if matches!(e, ProxyError::Unexpected(_) | ProxyError::Configuration(_)) {
            error!("Blofin proxy error: {}", e);
        }
        e
    })?;

    Ok(Json(data))
}
