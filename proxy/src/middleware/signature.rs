use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::ProxyError;

type HmacSha256 = Hmac<Sha256>;

/// The inputs the exchange hashes to authenticate one request.
///
/// `timestamp` is freshly generated per request and must never be reused;
/// the exchange rejects stale timestamps.
#[derive(Debug, Clone, Copy)]
pub struct SignatureContext<'a> {
    pub timestamp: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub body: &'a str,
}

impl SignatureContext<'_> {
    /// `timestamp + method + path + body`, no separators.
    pub fn message(&self) -> String {
        let mut msg = String::with_capacity(
            self.timestamp.len() + self.method.len() + self.path.len() + self.body.len(),
        );
        msg.push_str(self.timestamp);
        msg.push_str(self.method);
        msg.push_str(self.path);
        msg.push_str(self.body);
        msg
    }
}

/// Compute `base64(HMAC-SHA256(secret, message))`.
pub fn compute_signature(secret: &str, message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Holds the API secret and signs request contexts with it.
#[derive(Clone)]
pub struct RequestSigner {
    secret: Option<SecretString>,
}

impl RequestSigner {
    pub fn new(secret: Option<SecretString>) -> Self {
        Self { secret }
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn sign(&self, ctx: &SignatureContext<'_>) -> Result<String, ProxyError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or(ProxyError::Configuration("BLOFIN_API_SECRET"))?;
        Ok(compute_signature(secret.expose_secret(), &ctx.message()))
    }
}

/// Milliseconds since the Unix epoch as a decimal string.
pub fn fresh_timestamp() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}
