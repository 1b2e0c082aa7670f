//! Per-client sliding-window request limiter.
//!
//! Each client identifier owns the timestamps of its accepted requests inside
//! the trailing window. Stale timestamps are purged lazily on every check.
//! Client keys are never evicted, so the table grows with the number of
//! distinct clients seen since process start.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

pub struct SlidingWindowLimiter {
    limit: u32,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Records a request from `client` at `now`, or rejects it when the
    /// client already has `limit` requests inside the window.
    pub fn check(&self, client: &str, now: Instant) -> Result<(), AppError> {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stamps = clients.entry(client.to_string()).or_default();

        while let Some(&oldest) = stamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= self.limit as usize {
            let retry_after = stamps
                .front()
                .map(|&oldest| {
                    self.window
                        .saturating_sub(now.saturating_duration_since(oldest))
                })
                .unwrap_or(self.window);
            return Err(AppError::RateLimitExceeded {
                limit: self.limit,
                retry_after,
            });
        }

        stamps.push_back(now);
        Ok(())
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Identifies the caller for rate limiting.
///
/// Proxy headers are only honoured when the deployment says a trusted proxy
/// sits in front; the rightmost entry is the one that proxy appended.
pub fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        if let Some(ip) = x_forwarded_for_rightmost(headers) {
            return ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn x_forwarded_for_rightmost(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|hv| hv.to_str().ok())
        .and_then(|s| {
            s.split(',')
                .rev()
                .find_map(|part| part.trim().parse::<IpAddr>().ok())
        })
}

pub(crate) async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let client = client_key(request.headers(), peer, state.trust_proxy_headers);

    if let Err(err) = state.limiter.check(&client, Instant::now()) {
        warn!(client = %client, limit = state.limiter.limit(), "rate limit exceeded");
        return Err(err);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn third_request_in_window_is_rejected_and_window_rolls() {
        let limiter = SlidingWindowLimiter::new(2, secs(60));
        let t0 = Instant::now();

        assert!(limiter.check("10.0.0.1", t0).is_ok());
        assert!(limiter.check("10.0.0.1", t0 + secs(1)).is_ok());
        let err = limiter.check("10.0.0.1", t0 + secs(2)).unwrap_err();
        assert!(matches!(err, AppError::RateLimitExceeded { limit: 2, .. }));

        assert!(limiter.check("10.0.0.1", t0 + secs(61)).is_ok());
    }

    #[test]
    fn rejected_requests_are_not_counted() {
        let limiter = SlidingWindowLimiter::new(1, secs(60));
        let t0 = Instant::now();

        assert!(limiter.check("c", t0).is_ok());
        for i in 1..10 {
            assert!(limiter.check("c", t0 + secs(i)).is_err());
        }
        assert!(limiter.check("c", t0 + secs(60)).is_ok());
    }

    #[test]
    fn clients_are_counted_independently() {
        let limiter = SlidingWindowLimiter::new(2, secs(60));
        let t0 = Instant::now();

        limiter.check("a", t0).unwrap();
        limiter.check("a", t0).unwrap();
        assert!(limiter.check("a", t0).is_err());

        assert!(limiter.check("b", t0).is_ok());
        assert!(limiter.check("b", t0).is_ok());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn retry_after_points_at_oldest_request_leaving_the_window() {
        let limiter = SlidingWindowLimiter::new(1, secs(60));
        let t0 = Instant::now();
        limiter.check("c", t0).unwrap();

        match limiter.check("c", t0 + secs(45)) {
            Err(AppError::RateLimitExceeded { retry_after, .. }) => {
                assert_eq!(retry_after, secs(15));
            }
            other => panic!("expected rate limit rejection, got {other:?}"),
        }
    }

    #[test]
    fn client_key_prefers_peer_unless_proxy_is_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, garbage, 198.51.100.7"),
        );
        let peer: SocketAddr = "192.0.2.1:5000".parse().unwrap();

        assert_eq!(client_key(&headers, Some(peer), false), "192.0.2.1");
        assert_eq!(client_key(&headers, Some(peer), true), "198.51.100.7");
        assert_eq!(client_key(&HeaderMap::new(), Some(peer), true), "192.0.2.1");
        assert_eq!(client_key(&HeaderMap::new(), None, false), "unknown");
    }
}
