use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every way a proxied or relayed call can fail.
///
/// Handlers return these and the `IntoResponse` impl below turns them into the
/// structured JSON error bodies callers see. Messages never carry secrets.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A credential the call needs is missing from the deployment.
    #[error("{0} not configured")]
    Configuration(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    /// The downstream service answered with a non-success status.
    #[error("{platform} API error: {status}")]
    Downstream {
        platform: &'static str,
        status: u16,
        details: String,
    },

    #[error("{0}")]
    Unexpected(String),
}

impl ProxyError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Configuration(_) | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Downstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::unexpected("Upstream request timed out");
        }
        // Webhook and bot URLs embed their token, so the URL is stripped.
        Self::unexpected(e.without_url().to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(_) | Self::RateLimited => json!({ "error": self.to_string() }),
            Self::Downstream { details, .. } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            Self::Configuration(_) | Self::Unexpected(_) => {
                if let Self::Configuration(what) = &self {
                    error!("Configuration error: {} is missing", what);
                }
                json!({
                    "error": "Internal server error",
                    "message": self.to_string(),
                })
            }
        };
        (status, Json(body)).into_response()
    }
}
