//! Per-client request rate limiting.
//!
//! Each client IP gets its own sliding-window [`RateLimiter`]. The middleware
//! resolves the client address, records the request, and answers `429` with a
//! `retry-after` header once the window is full.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use super::{AppState, error::ApiError};
use crate::{logging, metrics};

/// Above this many tracked clients, idle entries are dropped on the next check
const PRUNE_THRESHOLD: usize = 10_000;

/// Rate limiter using a sliding window algorithm
#[derive(Debug)]
pub struct RateLimiter {
    /// Timestamps of recent requests
    timestamps: VecDeque<Instant>,
    /// Maximum number of requests allowed in the window
    max_requests: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Example
    ///
    /// ```
    /// use bz_server::api::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// // Allow 100 requests per minute
    /// let limiter = RateLimiter::new(100, Duration::from_secs(60));
    /// # let _ = limiter;
    /// ```
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::new(),
            max_requests,
            window,
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Check if a request should be allowed, recording it when it is
    ///
    /// # Example
    ///
    /// ```
    /// # use bz_server::api::rate_limiter::RateLimiter;
    /// # use std::time::Duration;
    /// let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
    ///
    /// for _ in 0..5 {
    ///     assert!(limiter.check());
    /// }
    ///
    /// assert!(!limiter.check());
    /// ```
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        self.evict(now);

        if self.timestamps.len() >= self.max_requests {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    /// Get the number of remaining requests allowed in the current window
    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }

    /// Time until the oldest request leaves the window
    pub fn reset_in(&self) -> Option<Duration> {
        self.timestamps.front().map(|oldest| {
            let elapsed = Instant::now().duration_since(*oldest);
            self.window.saturating_sub(elapsed)
        })
    }

    fn is_idle(&mut self, now: Instant) -> bool {
        self.evict(now);
        self.timestamps.is_empty()
    }
}

/// Sliding-window limiter keyed by client IP
#[derive(Debug)]
pub struct IpRateLimiter {
    clients: Mutex<HashMap<String, RateLimiter>>,
    max_requests: usize,
    window: Duration,
}

impl IpRateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Record a request from `client`; `Err` carries the time to wait
    pub fn check(&self, client: &str) -> Result<(), Duration> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if clients.len() > PRUNE_THRESHOLD {
            let now = Instant::now();
            clients.retain(|_, limiter| !limiter.is_idle(now));
        }

        let limiter = clients
            .entry(client.to_string())
            .or_insert_with(|| RateLimiter::new(self.max_requests, self.window));

        if limiter.check() {
            Ok(())
        } else {
            Err(limiter.reset_in().unwrap_or(self.window))
        }
    }

    /// Requests `client` may still make in the current window
    pub fn remaining(&self, client: &str) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(client)
            .map_or(self.max_requests, RateLimiter::remaining)
    }
}

/// Resolved client address, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

/// Client address: socket peer if known, else first `x-forwarded-for` hop
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(addr) = peer {
        return addr.ip().to_string();
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| "unknown".to_string(), str::to_string)
}

/// Middleware enforcing the per-IP limit on every route
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);

    if let Err(retry_after) = state.rate_limiter.check(&ip) {
        metrics::rate_limit_hits_total(request.uri().path());
        logging::log_security_event(
            "rate_limited",
            None,
            Some(&ip),
            &format!("Rate limit exceeded on {}", request.uri().path()),
        );
        return Err(ApiError::rate_limited(retry_after));
    }

    request.extensions_mut().insert(ClientIp(ip));
    Ok(next.run(request).await)
}
