use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::NotifyConfig;
use crate::error::ProxyError;
use crate::transport::{HttpVerb, OutboundRequest, Transport};

const DISCORD_USERNAME: &str = "BionicAI Trading Bot";

/// Inbound body of `POST /sendNotification`.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
    /// Telegram accepts numeric ids and `@channel` names alike.
    #[serde(rename = "chatId")]
    pub chat_id: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Telegram,
    Discord,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Discord => "discord",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Telegram => "Telegram",
            Self::Discord => "Discord",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relays free-form messages to a Telegram bot or a Discord webhook.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
    telegram_api_base: String,
    telegram_bot_token: Option<SecretString>,
    telegram_chat_id: Option<String>,
    discord_webhook_url: Option<SecretString>,
}

impl Notifier {
    pub fn new(config: &NotifyConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            telegram_api_base: config.telegram_api_base.trim_end_matches('/').to_string(),
            telegram_bot_token: config.telegram_bot_token.clone(),
            telegram_chat_id: config.telegram_chat_id.clone(),
            discord_webhook_url: config.discord_webhook_url.clone(),
        }
    }

    pub fn configured_platforms(&self) -> Vec<Platform> {
        [Platform::Telegram, Platform::Discord]
            .into_iter()
            .filter(|p| self.resolve(Some(p.as_str())).is_some())
            .collect()
    }

    /// Pick the platform named by `kind`, provided it is configured.
    fn resolve(&self, kind: Option<&str>) -> Option<Platform> {
        match kind {
            Some("telegram") if self.telegram_bot_token.is_some() => Some(Platform::Telegram),
            Some("discord") if self.discord_webhook_url.is_some() => Some(Platform::Discord),
            _ => None,
        }
    }

    pub async fn send(&self, req: NotificationRequest) -> Result<Platform, ProxyError> {
        let platform = self.resolve(req.kind.as_deref()).ok_or_else(|| {
            ProxyError::validation("Invalid notification type or missing configuration")
        })?;

        let message = req
            .message
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| ProxyError::validation("Message is required"))?;

        let request = match platform {
            Platform::Telegram => self.telegram_request(req.chat_id, &message)?,
            Platform::Discord => self.discord_request(&message)?,
        };

        info!("Relaying notification to {} ({} chars)", platform, message.chars().count());
        let resp = self.transport.execute(request).await?;

        if !resp.is_success() {
            let preview: String = resp.body.chars().take(200).collect();
            warn!("{} send failed {}: {}", platform.label(), resp.status, preview);
            return Err(ProxyError::Downstream {
                platform: platform.label(),
                status: resp.status,
                details: resp.body,
            });
        }

        debug!("{} message sent", platform.label());
        Ok(platform)
    }

    fn telegram_request(
        &self,
        chat_id: Option<Value>,
        text: &str,
    ) -> Result<OutboundRequest, ProxyError> {
        let token = self
            .telegram_bot_token
            .as_ref()
            .ok_or(ProxyError::Configuration("TELEGRAM_BOT_TOKEN"))?;

        let chat_id = match chat_id {
            Some(Value::String(s)) if !s.is_empty() => Value::String(s),
            Some(n @ Value::Number(_)) => n,
            _ => self
                .telegram_chat_id
                .clone()
                .map(Value::String)
                .ok_or_else(|| ProxyError::validation("chatId is required"))?,
        };

        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        Ok(OutboundRequest {
            method: HttpVerb::Post,
            url: format!(
                "{}/bot{}/sendMessage",
                self.telegram_api_base,
                token.expose_secret()
            ),
            headers: vec![("Content-Type", "application/json".to_string())],
            body: Some(body.to_string()),
        })
    }

    fn discord_request(&self, content: &str) -> Result<OutboundRequest, ProxyError> {
        let webhook = self
            .discord_webhook_url
            .as_ref()
            .ok_or(ProxyError::Configuration("DISCORD_WEBHOOK_URL"))?;

        let body = json!({
            "content": content,
            "username": DISCORD_USERNAME,
        });

        Ok(OutboundRequest {
            method: HttpVerb::Post,
            url: webhook.expose_secret().to_string(),
            headers: vec![("Content-Type", "application/json".to_string())],
            body: Some(body.to_string()),
        })
    }
}
