//! Per-identity sliding-window rate limiting for the game routes.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::RateLimitSettings;
use crate::error::ApiError;
use crate::http::AppState;

/// Sliding one-second window per client identity. Identity is the username
/// cookie when present, the peer IP otherwise.
pub struct RateLimiter {
    requests: DashMap<String, Vec<DateTime<Utc>>>,
    settings: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self { requests: DashMap::new(), settings }
    }

    /// Record one request for `identity`; false means over budget.
    pub fn check(&self, identity: &str) -> bool {
        if !self.settings.enabled {
            return true;
        }
        if self.settings.whitelist.iter().any(|w| w == identity) {
            return true;
        }
        let now = Utc::now();
        let window_start = now - Duration::seconds(1);
        let mut entry = self.requests.entry(identity.to_string()).or_default();
        entry.retain(|t| *t > window_start);
        if entry.len() < self.settings.game_requests_per_second as usize {
            entry.push(now);
            true
        } else {
            false
        }
    }
}

/// Tower middleware applied to every `/game/*` route.
pub async fn game_rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let identity = jar
        .get("username")
        .map(|c| c.value().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| addr.ip().to_string());
    if state.rate_limiter.check(&identity) {
        next.run(request).await
    } else {
        ApiError::RateLimited.into_response()
    }
}
