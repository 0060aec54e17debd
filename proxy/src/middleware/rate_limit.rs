use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::RateBudget;

/// Backing store for sliding-window rate limits.
///
/// `check_and_record` must be atomic per key: two callers racing on the same
/// key may never both observe a count below the limit and both be admitted.
/// A multi-process deployment swaps in a store backed by a shared key-value
/// service with atomic increment-and-expire semantics.
pub trait RateLimitStore: Send + Sync {
    /// Prune timestamps at or before `now_ms - window_ms`, then admit and
    /// record `now_ms` if fewer than `limit` remain.
    fn check_and_record(&self, key: &str, limit: usize, window_ms: i64, now_ms: i64) -> bool;

    /// Drop keys with no timestamp inside the window. Returns how many were removed.
    fn sweep(&self, now_ms: i64, window_ms: i64) -> usize;

    fn tracked_keys(&self) -> usize;
}

/// In-process store: key -> accepted-request timestamps (ms), oldest first.
///
/// Bounded to `max_keys` entries. When a new key arrives at capacity, stale
/// keys are swept first and then the least recently used key is evicted.
/// Keys share the map across budgets, so a key only counts as stale once its
/// newest timestamp is older than `horizon_ms`, the longest window in use.
pub struct MemoryStore {
    windows: DashMap<String, VecDeque<i64>>,
    max_keys: usize,
    horizon_ms: i64,
}

impl MemoryStore {
    pub fn new(max_keys: usize, horizon_ms: i64) -> Self {
        Self {
            windows: DashMap::new(),
            max_keys: max_keys.max(1),
            horizon_ms,
        }
    }

    fn make_room(&self, now_ms: i64, window_ms: i64) {
        self.sweep(now_ms, self.horizon_ms.max(window_ms));
        if self.windows.len() < self.max_keys {
            return;
        }

        let lru = self
            .windows
            .iter()
            .min_by_key(|e| e.value().back().copied().unwrap_or(i64::MIN))
            .map(|e| e.key().clone());

        if let Some(key) = lru {
            self.windows.remove(&key);
        }
    }
}

impl RateLimitStore for MemoryStore {
    fn check_and_record(&self, key: &str, limit: usize, window_ms: i64, now_ms: i64) -> bool {
        if !self.windows.contains_key(key) && self.windows.len() >= self.max_keys {
            self.make_room(now_ms, window_ms);
        }

        // The entry guard holds the shard's write lock until this returns.
        let mut timestamps = self.windows.entry(key.to_string()).or_default();

        let cutoff = now_ms - window_ms;
        timestamps.retain(|&t| t > cutoff);

        if timestamps.len() >= limit {
            return false;
        }

        timestamps.push_back(now_ms);
        true
    }

    fn sweep(&self, now_ms: i64, window_ms: i64) -> usize {
        let before = self.windows.len();
        let cutoff = now_ms - window_ms;
        self.windows
            .retain(|_, timestamps| timestamps.iter().any(|&t| t > cutoff));
        before.saturating_sub(self.windows.len())
    }

    fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// Sliding-window limiter shared by every handler.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    /// `horizon_ms` is the longest window any caller checks against.
    pub fn new(max_keys: usize, horizon_ms: i64) -> Self {
        Self::with_store(Arc::new(MemoryStore::new(max_keys, horizon_ms)))
    }

    pub fn with_store(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Returns true if the call is admitted (and records it).
    pub fn check(&self, key: &str, budget: RateBudget) -> bool {
        self.check_at(key, budget, Utc::now().timestamp_millis())
    }

    pub fn check_at(&self, key: &str, budget: RateBudget, now_ms: i64) -> bool {
        self.store
            .check_and_record(key, budget.limit, budget.window_ms, now_ms)
    }

    /// Periodically clean up stale entries to prevent memory growth.
    /// Call this from a background task.
    pub fn cleanup_stale_entries(&self, window_ms: i64) -> usize {
        self.store.sweep(Utc::now().timestamp_millis(), window_ms)
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.tracked_keys()
    }
}

/// `"<operation>_<identity>"`, e.g. `blofin_api_203.0.113.7`.
pub fn rate_limit_key(operation: &str, identity: &str) -> String {
    format!("{operation}_{identity}")
}
