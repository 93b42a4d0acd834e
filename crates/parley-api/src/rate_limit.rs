//! Per-client rolling-window rate limiter.
//!
//! Each client address gets an independent one-minute rolling window per
//! request class. A request is admitted if fewer than the class limit landed
//! in the preceding sixty seconds; stale timestamps are pruned on each check.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

use parley_core::config::RateLimitConfig;

const WINDOW: Duration = Duration::from_secs(60);

/// Request classes with independent per-minute limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// Chat turns and audio transcriptions.
    Chat,
    /// History reads.
    Read,
    /// History deletes.
    Delete,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<(String, RequestClass), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn limit_for(&self, class: RequestClass) -> u32 {
        match class {
            RequestClass::Chat => self.config.chat_per_minute,
            RequestClass::Read => self.config.reads_per_minute,
            RequestClass::Delete => self.config.deletes_per_minute,
        }
    }

    /// Admit or reject one request for `client` in `class`.
    pub fn check(&self, client: &str, class: RequestClass) -> bool {
        self.check_at(client, class, Instant::now())
    }

    fn check_at(&self, client: &str, class: RequestClass, now: Instant) -> bool {
        let limit = self.limit_for(class) as usize;
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let entry = windows
            .entry((client.to_string(), class))
            .or_default();
        entry.retain(|t| now.duration_since(*t) < WINDOW);
        if entry.len() >= limit {
            return false;
        }
        entry.push(now);
        true
    }
}

/// Client key for rate limiting: the first forwarded address, falling back
/// to a shared local bucket when no proxy header is present.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            chat_per_minute: 3,
            reads_per_minute: 5,
            deletes_per_minute: 2,
        })
    }

    #[test]
    fn test_limit_is_enforced_per_class() {
        let l = limiter();
        for _ in 0..3 {
            assert!(l.check("a", RequestClass::Chat));
        }
        assert!(!l.check("a", RequestClass::Chat));
        // Reads have their own budget.
        assert!(l.check("a", RequestClass::Read));
    }

    #[test]
    fn test_clients_are_independent() {
        let l = limiter();
        for _ in 0..3 {
            assert!(l.check("a", RequestClass::Chat));
        }
        assert!(!l.check("a", RequestClass::Chat));
        assert!(l.check("b", RequestClass::Chat));
    }

    #[test]
    fn test_window_rolls_forward() {
        let l = limiter();
        let start = Instant::now();
        for _ in 0..2 {
            assert!(l.check_at("a", RequestClass::Delete, start));
        }
        assert!(!l.check_at("a", RequestClass::Delete, start));
        // Sixty-one seconds later the old requests have aged out.
        let later = start + Duration::from_secs(61);
        assert!(l.check_at("a", RequestClass::Delete, later));
    }

    #[test]
    fn test_client_key_from_forwarded_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), "local");
        headers.insert("x-forwarded-for", "10.1.2.3, 10.0.0.1".parse().unwrap());
        assert_eq!(client_key(&headers), "10.1.2.3");
    }
}
