use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;
pub const DEFAULT_WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window_ms: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_time: i64,
}

/// Fixed-window counter keyed by caller identifier.
///
/// A window opens on the first call from an identifier and lasts `window_ms`.
/// Bursts right after a window boundary are allowed. Buckets are never pruned,
/// so memory grows with the number of distinct identifiers seen. Identifiers
/// must come from a source the caller cannot choose freely (see
/// `http_server::client_identifier`), or that growth is attacker-driven.
#[derive(Clone, Default)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Check and count one attempt using the configured limits.
    pub fn allow(&self, identifier: &str) -> bool {
        self.allow_with(identifier, self.config.max_attempts, self.config.window_ms)
    }

    pub fn allow_with(&self, identifier: &str, max_attempts: u32, window_ms: i64) -> bool {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.allow_at(identifier, max_attempts, window_ms, now_ms)
    }

    /// Check and count one attempt at `now_ms` (epoch millis).
    /// The whole read-modify-write happens under one lock, so concurrent
    /// callers can never push a bucket past `max_attempts`.
    pub fn allow_at(
        &self,
        identifier: &str,
        max_attempts: u32,
        window_ms: i64,
        now_ms: i64,
    ) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        match buckets.get_mut(identifier) {
            Some(bucket) if now_ms <= bucket.reset_time => {
                if bucket.count >= max_attempts {
                    tracing::warn!(
                        identifier,
                        count = bucket.count,
                        max_attempts,
                        "rate limit exceeded"
                    );
                    return false;
                }
                bucket.count += 1;
                true
            }
            _ => {
                buckets.insert(
                    identifier.to_string(),
                    Bucket {
                        count: 1,
                        reset_time: now_ms.saturating_add(window_ms),
                    },
                );
                true
            }
        }
    }

    /// Number of identifiers currently holding a bucket, expired ones included.
    pub fn tracked_identifiers(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[cfg(test)]
    fn count_for(&self, identifier: &str) -> Option<u32> {
        self.buckets
            .lock()
            .unwrap()
            .get(identifier)
            .map(|b| b.count)
    }
}
