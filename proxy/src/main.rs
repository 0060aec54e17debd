mod config;
mod error;
mod exchange;
mod middleware;
mod notify;
mod routes;
mod sweeper;
mod transport;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{ProxyConfig, RateBudget};
use crate::exchange::BlofinClient;
use crate::middleware::rate_limit::RateLimiter;
use crate::notify::Notifier;
use crate::transport::{HttpTransport, Transport};

/// Shared application state passed to all route handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub blofin: BlofinClient,
    pub notifier: Notifier,
    pub rate_limiter: RateLimiter,
    pub proxy_budget: RateBudget,
    pub notify_budget: RateBudget,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(config: &ProxyConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            blofin: BlofinClient::new(config, transport.clone()),
            notifier: Notifier::new(&config.notify, transport),
            rate_limiter: RateLimiter::new(
                config.rate_limit_max_keys,
                config.longest_window_ms(),
            ),
            proxy_budget: config.proxy_budget,
            notify_budget: config.notify_budget,
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignored in production where env vars are set externally)
    let _ = dotenvy::dotenv();

    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ProxyConfig::from_env()?;
    info!(
        "Configuration loaded (port={}, base_url={}, limit={}/{}ms)",
        config.port,
        config.blofin_base_url,
        config.proxy_budget.limit,
        config.proxy_budget.window_ms
    );

    if config.credentials.api_secret.is_none() {
        warn!("BLOFIN_API_SECRET is not set; /blofinProxy calls will fail until it is");
    }
    if config.allowed_path_prefixes.is_empty() {
        warn!("ALLOWED_PATH_PREFIXES is empty; any exchange path will be signed and forwarded");
    }

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(Duration::from_secs(
        config.upstream_timeout_secs,
    ))?);
    let state = AppState::new(&config, transport);

    // Spawn background sweeper for stale rate-limit keys
    let sweep_limiter = state.rate_limiter.clone();
    let sweep_window = config.longest_window_ms();
    let sweep_interval = config.sweep_interval_secs;
    tokio::spawn(async move {
        sweeper::run_sweeper(sweep_limiter, sweep_window, sweep_interval).await;
    });

    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Blofin gateway v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);
    info!("Routes:");
    info!("  GET  /api/health");
    info!("  POST /blofinProxy");
    info!("  POST /sendNotification");
    info!("  GET  /blofinWebSocket");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
