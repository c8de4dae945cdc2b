use axum::http::HeaderMap;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::metrics::RATE_LIMIT_ENTRIES;

/// Bucket shared by every client that sent no proxy address header.
pub const UNKNOWN_CLIENT: &str = "unknown";

// Proxy headers consulted for the client key, first populated wins
const CLIENT_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

// Rate limit entry - tracks requests per IP/key
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: Instant,
}

/// Outcome of a single [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Time left until the key's window resets.
    pub reset_after: Duration,
}

impl RateDecision {
    /// Whole seconds for a `Retry-After` header, never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        let rounded = if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        };
        rounded.max(1)
    }
}

/// Fixed-window request counter per client key.
///
/// State lives in this process only. Several gateway instances behind a load
/// balancer each keep their own counts, so the effective limit is
/// `max_requests * instances`.
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Counts one request for `key` at `now`.
    ///
    /// The entry's shard stays write-locked for the whole read-check-increment,
    /// so concurrent callers on one key cannot both take the last slot.
    /// A limit of zero denies everything.
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        if self.max_requests == 0 {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_after: self.window,
            };
        }

        let (decision, inserted) = self.count_at(key, now);
        if inserted {
            // the entry guard is gone by now; len() takes every shard lock
            RATE_LIMIT_ENTRIES.set(self.entries.len() as f64);
        }
        decision
    }

    fn count_at(&self, key: &str, now: Instant) -> (RateDecision, bool) {
        let mut inserted = false;
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| {
                inserted = true;
                RateLimitEntry {
                    count: 0,
                    reset_at: now + self.window,
                }
            });

        // window expired..? replace it
        if entry.count == 0 || now > entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + self.window;
            let decision = RateDecision {
                allowed: true,
                remaining: self.max_requests - 1,
                reset_after: self.window,
            };
            return (decision, inserted);
        }

        let reset_after = entry.reset_at.saturating_duration_since(now);

        // over limit, leave the count alone
        if entry.count >= self.max_requests {
            let decision = RateDecision {
                allowed: false,
                remaining: 0,
                reset_after,
            };
            return (decision, inserted);
        }

        entry.count += 1;
        let decision = RateDecision {
            allowed: true,
            remaining: self.max_requests - entry.count,
            reset_after,
        };
        (decision, inserted)
    }

    /// Drops every entry whose window has passed. Returns how many went.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.reset_at);
        let removed = before - self.entries.len();
        RATE_LIMIT_ENTRIES.set(self.entries.len() as f64);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Sweeper - runs every `every` until the handle is aborted
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(every);
        tracing::info!(interval = ?every, "rate limit sweeper started");

        loop {
            interval.tick().await;
            let removed = limiter.sweep();
            if removed > 0 {
                tracing::debug!(removed, remaining = limiter.len(), "swept expired rate limit entries");
            }
        }
    })
}

/// Derives the limiter key from proxy headers.
///
/// Falls back to [`UNKNOWN_CLIENT`], so clients without any of the headers
/// share one bucket.
pub fn client_key(headers: &HeaderMap) -> String {
    CLIENT_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
