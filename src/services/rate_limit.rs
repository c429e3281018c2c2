//! Per-client request rate limiting
//!
//! Fixed windows: the first request from a client opens a window, and once
//! more than `max_requests` land inside it the client is refused until it
//! closes.

use dashmap::DashMap;
use hyper::HeaderMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitConfig {
    /// Credential endpoints
    pub const STRICT: Self = Self {
        window: Duration::from_secs(60),
        max_requests: 5,
    };

    /// Code generation
    pub const MODERATE: Self = Self {
        window: Duration::from_secs(60),
        max_requests: 20,
    };

    /// Everything else that wants a limit
    pub const RELAXED: Self = Self {
        window: Duration::from_secs(60),
        max_requests: 60,
    };
}

/// Outcome of a refused request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limited {
    /// Whole seconds until the window closes, at least 1
    pub retry_after: u64,
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: Instant,
}

pub struct RateLimiter {
    name: &'static str,
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(name: &'static str, config: RateLimitConfig) -> Self {
        Self {
            name,
            config,
            windows: DashMap::new(),
        }
    }

    pub fn strict() -> Self {
        Self::new("strict", RateLimitConfig::STRICT)
    }

    pub fn moderate() -> Self {
        Self::new("moderate", RateLimitConfig::MODERATE)
    }

    pub fn relaxed() -> Self {
        Self::new("relaxed", RateLimitConfig::RELAXED)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Count a request from `key`
    pub fn check(&self, key: &str) -> Result<(), Limited> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), Limited> {
        let mut window = self.windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            reset_at: now + self.config.window,
        });

        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + self.config.window;
        }

        window.count += 1;
        if window.count > self.config.max_requests {
            let remaining = window.reset_at.saturating_duration_since(now);
            let retry_after = remaining.as_millis().div_ceil(1000).max(1) as u64;
            debug!(limiter = self.name, key, retry_after, "Rate limit exceeded");
            return Err(Limited { retry_after });
        }

        Ok(())
    }

    /// Drop closed windows, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| now < w.reset_at);
        before - self.windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Client identity: first `x-forwarded-for` entry, then `x-real-ip`, then the
/// peer address.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }

    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Sweep closed windows every minute
pub fn spawn_cleanup_task(limiters: Vec<Arc<RateLimiter>>) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60);
        loop {
            tokio::time::sleep(interval).await;
            for limiter in &limiters {
                let removed = limiter.cleanup();
                if removed > 0 {
                    debug!(
                        "Rate limit cleanup ({}): removed {} expired windows",
                        limiter.name(),
                        removed
                    );
                }
            }
        }
    });
    info!("Rate limit cleanup task started");
}
