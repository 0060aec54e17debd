use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::middleware::signature::{fresh_timestamp, RequestSigner, SignatureContext};
use crate::transport::{HttpVerb, OutboundRequest, Transport};

/// Inbound body of `POST /blofinProxy`.
#[derive(Debug, Default, Deserialize)]
pub struct ProxyRequest {
    pub endpoint: Option<String>,
    pub method: Option<String>,
    /// Usually a JSON string; any other JSON value is forwarded in its
    /// compact serialized form.
    pub body: Option<Value>,
}

/// A validated call, ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCall {
    pub path: String,
    pub method: HttpVerb,
    pub body: String,
}

impl OutboundCall {
    pub fn from_request(
        req: ProxyRequest,
        allowed_prefixes: &[String],
    ) -> Result<Self, ProxyError> {
        let path = req
            .endpoint
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProxyError::validation("Endpoint is required"))?;

        if !path.starts_with('/') {
            return Err(ProxyError::validation("Endpoint must start with '/'"));
        }

        if !allowed_prefixes.is_empty()
            && !allowed_prefixes.iter().any(|p| path.starts_with(p.as_str()))
        {
            return Err(ProxyError::validation(format!("Endpoint not permitted: {path}")));
        }

        let method = match req.method.as_deref() {
            None => HttpVerb::Get,
            Some(raw) => HttpVerb::parse(raw)
                .ok_or_else(|| ProxyError::validation(format!("Unsupported method: {raw}")))?,
        };

        let body = match req.body {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };

        Ok(Self { path, method, body })
    }
}

/// Signs calls with the exchange credentials and forwards them.
#[derive(Clone)]
pub struct BlofinClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    api_key: Option<SecretString>,
    passphrase: Option<SecretString>,
    signer: RequestSigner,
    allowed_prefixes: Vec<String>,
}

impl BlofinClient {
    pub fn new(config: &ProxyConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: config.blofin_base_url.trim_end_matches('/').to_string(),
            api_key: config.credentials.api_key.clone(),
            passphrase: config.credentials.passphrase.clone(),
            signer: RequestSigner::new(config.credentials.api_secret.clone()),
            allowed_prefixes: config.allowed_path_prefixes.clone(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.passphrase.is_some() && self.signer.has_secret()
    }

    pub fn prepare(&self, req: ProxyRequest) -> Result<OutboundCall, ProxyError> {
        OutboundCall::from_request(req, &self.allowed_prefixes)
    }

    /// Headers the exchange requires on every authenticated call.
    fn auth_headers(
        &self,
        signature: String,
        timestamp: String,
    ) -> Result<Vec<(&'static str, String)>, ProxyError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ProxyError::Configuration("BLOFIN_API_KEY"))?;
        let passphrase = self
            .passphrase
            .as_ref()
            .ok_or(ProxyError::Configuration("BLOFIN_API_PASSPHRASE"))?;

        Ok(vec![
            ("ACCESS-KEY", api_key.expose_secret().to_string()),
            ("ACCESS-SIGN", signature),
            ("ACCESS-TIMESTAMP", timestamp),
            ("ACCESS-PASSPHRASE", passphrase.expose_secret().to_string()),
            ("Content-Type", "application/json".to_string()),
        ])
    }

    /// Sign `call` with a fresh timestamp, send it, and return the parsed JSON body.
    ///
    /// A non-success status comes back as `ProxyError::Downstream` carrying the
    /// exchange's status and body text. Nothing is retried: a retried call
    /// would carry a stale timestamp.
    pub async fn forward(&self, call: &OutboundCall) -> Result<Value, ProxyError> {
        let timestamp = fresh_timestamp();
        let signature = self.signer.sign(&SignatureContext {
            timestamp: &timestamp,
            method: call.method.as_str(),
            path: &call.path,
            body: &call.body,
        })?;
        let headers = self.auth_headers(signature, timestamp)?;

        let url = format!("{}{}", self.base_url, call.path);
        info!("Making Blofin API call: {} {}", call.method, url);

        // GET must not carry a body.
        let body = (call.method != HttpVerb::Get).then(|| call.body.clone());

        let resp = self
            .transport
            .execute(OutboundRequest {
                method: call.method,
                url,
                headers,
                body,
            })
            .await?;

        if !resp.is_success() {
            let preview: String = resp.body.chars().take(200).collect();
            error!("Blofin API error: {} - {}", resp.status, preview);
            return Err(ProxyError::Downstream {
                platform: "Blofin",
                status: resp.status,
                details: resp.body,
            });
        }

        let data: Value = serde_json::from_str(&resp.body)
            .map_err(|e| ProxyError::unexpected(format!("Invalid JSON from Blofin API: {e}")))?;

        info!("Blofin API success: {}", call.path);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::signature::compute_signature;
    use crate::transport::mock::RecordingTransport;
    use serde_json::json;

    fn config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.blofin_base_url = "https://exchange.test".into();
        config.credentials.api_key = Some(SecretString::from("key-1"));
        config.credentials.api_secret = Some(SecretString::from("S3cr3t"));
        config.credentials.passphrase = Some(SecretString::from("pass-1"));
        config
    }

    fn header<'a>(req: &'a OutboundRequest, name: &str) -> &'a str {
        req.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| panic!("missing header {name}"))
    }

    fn request(value: Value) -> ProxyRequest {
        serde_json::from_value(value).unwrap()
    }

    fn outbound(value: Value, allowed: &[String]) -> Result<OutboundCall, ProxyError> {
        OutboundCall::from_request(request(value), allowed)
    }

    #[test]
    fn test_endpoint_required() {
        let err = outbound(json!({}), &[]).unwrap_err();
        assert_eq!(err.to_string(), "Endpoint is required");

        let err = outbound(json!({ "endpoint": "" }), &[]).unwrap_err();
        assert_eq!(err.to_string(), "Endpoint is required");
    }

    #[test]
    fn test_defaults_to_get_with_empty_body() {
        let call = outbound(json!({ "endpoint": "/api/v1/account" }), &[]).unwrap();
        assert_eq!(call.method, HttpVerb::Get);
        assert_eq!(call.body, "");
    }

    #[test]
    fn test_method_normalized_and_validated() {
        let call = OutboundCall::from_request(
            request(json!({ "endpoint": "/api/v1/trade/order", "method": "post" })),
            &[],
        )
        .unwrap();
        assert_eq!(call.method, HttpVerb::Post);

        let err = OutboundCall::from_request(
            request(json!({ "endpoint": "/api/v1/trade/order", "method": "PATCH" })),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));
    }

    #[test]
    fn test_object_body_is_serialized() {
        let body = json!({
            "endpoint": "/api/v1/trade/order",
            "method": "POST",
            "body": { "instId": "BTC-USDT" },
        });
        let call = outbound(body, &[]).unwrap();
        assert_eq!(call.body, r#"{"instId":"BTC-USDT"}"#);
    }

    #[test]
    fn test_allowlist() {
        let allowed = vec!["/api/v1/".to_string()];
        assert!(outbound(json!({ "endpoint": "/api/v1/account" }), &allowed).is_ok());

        let err = outbound(json!({ "endpoint": "/admin/keys" }), &allowed).unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));

        let err = outbound(json!({ "endpoint": "api/v1/account" }), &[]).unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_forward_signs_and_attaches_headers() {
        let transport = Arc::new(RecordingTransport::replying(200, r#"{"code":"0"}"#));
        let client = BlofinClient::new(&config(), transport.clone());

        let call = OutboundCall {
            path: "/api/v1/trade/order".into(),
            method: HttpVerb::Post,
            body: r#"{"instId":"BTC-USDT"}"#.into(),
        };
        let data = client.forward(&call).await.unwrap();
        assert_eq!(data, json!({ "code": "0" }));

        let sent = transport.last_call();
        assert_eq!(sent.url, "https://exchange.test/api/v1/trade/order");
        assert_eq!(sent.method, HttpVerb::Post);
        assert_eq!(sent.body.as_deref(), Some(r#"{"instId":"BTC-USDT"}"#));
        assert_eq!(header(&sent, "ACCESS-KEY"), "key-1");
        assert_eq!(header(&sent, "ACCESS-PASSPHRASE"), "pass-1");
        assert_eq!(header(&sent, "Content-Type"), "application/json");

        let ts = header(&sent, "ACCESS-TIMESTAMP");
        let expected = compute_signature(
            "S3cr3t",
            &format!("{ts}POST/api/v1/trade/order{{\"instId\":\"BTC-USDT\"}}"),
        );
        assert_eq!(header(&sent, "ACCESS-SIGN"), expected);
    }

    #[tokio::test]
    async fn test_get_never_carries_body() {
        let transport = Arc::new(RecordingTransport::replying(200, "{}"));
        let client = BlofinClient::new(&config(), transport.clone());

        let call = OutboundCall {
            path: "/api/v1/account".into(),
            method: HttpVerb::Get,
            body: r#"{"ignored":true}"#.into(),
        };
        client.forward(&call).await.unwrap();

        let sent = transport.last_call();
        assert!(sent.body.is_none());
        // The signature still covers the caller-supplied body.
        let ts = header(&sent, "ACCESS-TIMESTAMP");
        let expected = compute_signature(
            "S3cr3t",
            &format!("{ts}GET/api/v1/account{{\"ignored\":true}}"),
        );
        assert_eq!(header(&sent, "ACCESS-SIGN"), expected);
    }

    #[tokio::test]
    async fn test_downstream_status_propagated() {
        let transport = Arc::new(RecordingTransport::replying(503, "service unavailable"));
        let client = BlofinClient::new(&config(), transport);

        let call = OutboundCall {
            path: "/api/v1/account".into(),
            method: HttpVerb::Get,
            body: String::new(),
        };
        match client.forward(&call).await.unwrap_err() {
            ProxyError::Downstream { status, details, .. } => {
                assert_eq!(status, 503);
                assert_eq!(details, "service unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_is_unexpected() {
        let transport = Arc::new(RecordingTransport::replying(200, "<html>"));
        let client = BlofinClient::new(&config(), transport);

        let call = OutboundCall {
            path: "/api/v1/account".into(),
            method: HttpVerb::Get,
            body: String::new(),
        };
        assert!(matches!(client.forward(&call).await.unwrap_err(), ProxyError::Unexpected(_)));
    }

    #[tokio::test]
    async fn test_missing_secret_makes_no_call() {
        let mut cfg = config();
        cfg.credentials.api_secret = None;
        let transport = Arc::new(RecordingTransport::replying(200, "{}"));
        let client = BlofinClient::new(&cfg, transport.clone());

        let call = OutboundCall {
            path: "/api/v1/account".into(),
            method: HttpVerb::Get,
            body: String::new(),
        };
        let err = client.forward(&call).await.unwrap_err();
        assert!(matches!(err, ProxyError::Configuration("BLOFIN_API_SECRET")));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_passphrase_makes_no_call() {
        let mut cfg = config();
        cfg.credentials.passphrase = None;
        let transport = Arc::new(RecordingTransport::replying(200, "{}"));
        let client = BlofinClient::new(&cfg, transport.clone());

        let call = OutboundCall {
            path: "/api/v1/account".into(),
            method: HttpVerb::Get,
            body: String::new(),
        };
        let err = client.forward(&call).await.unwrap_err();
        assert!(matches!(err, ProxyError::Configuration("BLOFIN_API_PASSPHRASE")));
        assert_eq!(transport.call_count(), 0);
    }
}
