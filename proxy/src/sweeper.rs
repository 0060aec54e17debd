use std::time::Duration;
use tracing::{debug, info};

use crate::middleware::rate_limit::RateLimiter;

/// Background task that evicts rate-limit keys with no request inside
/// `window_ms`, so the store does not grow with every caller ever seen.
///
/// Runs on an interval (default: 300 seconds).
pub async fn run_sweeper(rate_limiter: RateLimiter, window_ms: i64, interval_secs: u64) {
    let interval = Duration::from_secs(interval_secs);

    info!(
        "Rate-limit sweeper started (interval: {}s, window: {}ms)",
        interval_secs, window_ms
    );

    loop {
        tokio::time::sleep(interval).await;

        let removed = rate_limiter.cleanup_stale_entries(window_ms);
        if removed > 0 {
            info!(
                "Swept {} stale rate-limit keys ({} tracked)",
                removed,
                rate_limiter.tracked_keys()
            );
        } else {
            debug!("Sweep found nothing stale ({} tracked)", rate_limiter.tracked_keys());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateBudget;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_stale_keys() {
        let limiter = RateLimiter::new(100, 60_000);
        let budget = RateBudget {
            limit: 30,
            window_ms: 60_000,
        };
        // Recorded far in the past relative to the wall clock
        assert!(limiter.check_at("blofin_api_stale", budget, 0));
        assert!(limiter.check("blofin_api_live", budget));
        assert_eq!(limiter.tracked_keys(), 2);

        let handle = tokio::spawn(run_sweeper(limiter.clone(), 60_000, 1));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        handle.abort();

        assert_eq!(limiter.tracked_keys(), 1);
    }
}
