use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use std::net::SocketAddr;

pub const UNKNOWN_CALLER: &str = "unknown";

/// Resolve the rate-limit partition key for a caller.
///
/// Uses the connecting socket address, or the first `X-Forwarded-For` hop
/// when the proxy sits behind a trusted load balancer. Never fails: an
/// unresolvable caller is bucketed under `"unknown"`.
pub fn caller_identity(
    peer: Option<&ConnectInfo<SocketAddr>>,
    headers: &HeaderMap,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer.map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string())
}
