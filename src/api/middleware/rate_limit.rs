use crate::api::error::AppError;
use crate::utils::client_ip::client_ip;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Buckets kept before expired windows are swept.
const SWEEP_THRESHOLD: usize = 10_000;

struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Adds the `RateLimit-*` headers unless an inner limiter already set them.
    fn apply_headers(&self, headers: &mut HeaderMap) {
        if headers.contains_key(RATE_LIMIT_LIMIT) {
            return;
        }
        headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(
            RATE_LIMIT_RESET,
            HeaderValue::from(self.reset_after.as_secs().max(1)),
        );
    }
}

/// Fixed-window request counter keyed by client IP.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    max_requests: u32,
    window: Duration,
    message: String,
    trust_proxy: bool,
}

impl RateLimiter {
    pub fn new(
        max_requests: u32,
        window_secs: u64,
        message: impl Into<String>,
        trust_proxy: bool,
    ) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window: Duration::from_secs(window_secs),
            message: message.into(),
            trust_proxy,
        }
    }

    /// Counts one request for `key` and reports whether it fits the window.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        if self.windows.len() > SWEEP_THRESHOLD {
            self.windows.retain(|_, w| w.reset_at > now);
        }

        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });

        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }

        let allowed = window.count < self.max_requests;
        if allowed {
            window.count += 1;
        }

        RateLimitDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(window.count),
            reset_after: window.reset_at.saturating_duration_since(now),
        }
    }
}

/// Human wording for a window length, as used in the 429 message.
pub fn window_phrase(secs: u64) -> String {
    let (n, unit) = if secs > 0 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs > 0 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    match (n, unit) {
        (1, "hour") => "an hour".to_string(),
        (1, unit) => format!("a {}", unit),
        (n, unit) => format!("{} {}s", n, unit),
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req, limiter.trust_proxy);
    let decision = limiter.check(&ip);

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        tracing::warn!("Rate limit exceeded for IP {} on {}", ip, req.uri().path());
        AppError::TooManyRequests(limiter.message.clone()).into_response()
    };

    decision.apply_headers(response.headers_mut());
    response
}
