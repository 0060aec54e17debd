use anyhow::{Context, Result};
use secrecy::SecretString;

/// Credentials the exchange requires on every signed call.
///
/// Each field is optional at load time: a missing credential surfaces as a
/// configuration error on the request that needs it, not as a startup failure.
#[derive(Debug, Clone, Default)]
pub struct ExchangeCredentials {
    pub api_key: Option<SecretString>,
    pub api_secret: Option<SecretString>,
    pub passphrase: Option<SecretString>,
}

/// Chat platform targets for the notification relay.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub telegram_api_base: String,
    pub telegram_bot_token: Option<SecretString>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<SecretString>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_api_base: "https://api.telegram.org".to_string(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            discord_webhook_url: None,
        }
    }
}

/// A rate limit budget: at most `limit` accepted calls per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub limit: usize,
    pub window_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub blofin_base_url: String,
    pub credentials: ExchangeCredentials,
    /// Empty means every endpoint path is forwarded.
    pub allowed_path_prefixes: Vec<String>,
    pub proxy_budget: RateBudget,
    pub notify_budget: RateBudget,
    pub rate_limit_max_keys: usize,
    pub sweep_interval_secs: u64,
    pub upstream_timeout_secs: u64,
    pub trust_forwarded_for: bool,
    pub notify: NotifyConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            blofin_base_url: "https://openapi.blofin.com".to_string(),
            credentials: ExchangeCredentials::default(),
            allowed_path_prefixes: vec!["/api/v1/".to_string()],
            proxy_budget: RateBudget {
                limit: 30,
                window_ms: 60_000,
            },
            notify_budget: RateBudget {
                limit: 10,
                window_ms: 60_000,
            },
            rate_limit_max_keys: 10_000,
            sweep_interval_secs: 300,
            upstream_timeout_secs: 10,
            trust_forwarded_for: false,
            notify: NotifyConfig::default(),
        }
    }
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            port: env_parse("PORT", defaults.port)?,
            blofin_base_url: env_or("BLOFIN_BASE_URL", &defaults.blofin_base_url)
                .trim_end_matches('/')
                .to_string(),
            credentials: ExchangeCredentials {
                api_key: env_secret("BLOFIN_API_KEY"),
                api_secret: env_secret("BLOFIN_API_SECRET"),
                passphrase: env_secret("BLOFIN_API_PASSPHRASE"),
            },
            allowed_path_prefixes: match std::env::var("ALLOWED_PATH_PREFIXES") {
                Ok(raw) => parse_prefixes(&raw),
                Err(_) => defaults.allowed_path_prefixes,
            },
            proxy_budget: RateBudget {
                limit: env_parse("PROXY_RATE_LIMIT", defaults.proxy_budget.limit)?,
                window_ms: env_parse("PROXY_RATE_WINDOW_MS", defaults.proxy_budget.window_ms)?,
            },
            notify_budget: RateBudget {
                limit: env_parse("NOTIFY_RATE_LIMIT", defaults.notify_budget.limit)?,
                window_ms: env_parse("NOTIFY_RATE_WINDOW_MS", defaults.notify_budget.window_ms)?,
            },
            rate_limit_max_keys: env_parse("RATE_LIMIT_MAX_KEYS", defaults.rate_limit_max_keys)?,
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)?,
            upstream_timeout_secs: env_parse(
                "UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout_secs,
            )?,
            trust_forwarded_for: env_or("TRUST_FORWARDED_FOR", "false") == "true",
            notify: NotifyConfig {
                telegram_api_base: env_or("TELEGRAM_API_BASE", &defaults.notify.telegram_api_base)
                    .trim_end_matches('/')
                    .to_string(),
                telegram_bot_token: env_secret("TELEGRAM_BOT_TOKEN"),
                telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID")
                    .ok()
                    .filter(|v| !v.is_empty()),
                discord_webhook_url: env_secret("DISCORD_WEBHOOK_URL"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, budget) in [("PROXY", self.proxy_budget), ("NOTIFY", self.notify_budget)] {
            if budget.limit == 0 || budget.window_ms <= 0 {
                anyhow::bail!("{name}_RATE_LIMIT and {name}_RATE_WINDOW_MS must be positive");
            }
        }
        if self.rate_limit_max_keys == 0 {
            anyhow::bail!("RATE_LIMIT_MAX_KEYS must be positive");
        }
        if self.upstream_timeout_secs == 0 {
            anyhow::bail!("UPSTREAM_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }

    /// The longest window any rate limited operation uses; the sweeper keeps
    /// every key that still has a timestamp inside it.
    pub fn longest_window_ms(&self) -> i64 {
        self.proxy_budget.window_ms.max(self.notify_budget.window_ms)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secret(key: &str) -> Option<SecretString> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + ToString,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>()))
}

fn parse_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
