use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct WindowState {
    start: Instant,
    count: u32,
}

/// Fixed one-second window per client key.
///
/// The key is the peer address of the connection. `X-Forwarded-For` is only
/// honoured when the service is configured to sit behind a trusted proxy,
/// since any client can set it.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    trust_forwarded: bool,
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl RateLimiter {
    fn new(rps: u32, trust_forwarded: bool) -> Self {
        Self {
            rps: rps.max(1),
            trust_forwarded,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn client_key(&self, req: &Request<Body>) -> String {
        let forwarded = || {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let peer = || {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        };
        let key = if self.trust_forwarded {
            forwarded().or_else(peer)
        } else {
            peer()
        };
        key.unwrap_or_else(|| "unknown".to_string())
    }

    fn allow(&self, key: &str) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        // Forget clients idle for a minute.
        windows.retain(|_, w| now.duration_since(w.start) < WINDOW * 60);
        let window = windows.entry(key.to_string()).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if now.duration_since(window.start) >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        if window.count < self.rps {
            window.count += 1;
            true
        } else {
            false
        }
    }
}

pub async fn rps_middleware(
    State(state): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = state.client_key(&req);
    if !state.allow(&key) {
        tracing::warn!(client = %key, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "rate_limit_exceeded", "code": "rate_limited"})),
        )
            .into_response();
    }
    next.run(req).await
}

pub fn new_rps_state(rps: u32, trust_forwarded: bool) -> RateLimiter {
    RateLimiter::new(rps, trust_forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(peer: [u8; 4], forwarded: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/interview/confirm");
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
        req
    }

    #[test]
    fn window_is_per_client() {
        let limiter = new_rps_state(2, false);
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
    }

    #[test]
    fn rotating_forwarded_header_does_not_reset_the_window() {
        let limiter = new_rps_state(2, false);
        let keys: Vec<String> = (0..3)
            .map(|i| limiter.client_key(&request([203, 0, 113, 7], Some(&format!("10.9.9.{}", i)))))
            .collect();
        assert!(keys.iter().all(|k| k == "203.0.113.7"));
        assert!(limiter.allow(&keys[0]));
        assert!(limiter.allow(&keys[1]));
        assert!(!limiter.allow(&keys[2]));
    }

    #[test]
    fn forwarded_header_is_used_behind_a_trusted_proxy() {
        let limiter = new_rps_state(2, true);
        let req = request([10, 0, 0, 2], Some("198.51.100.4, 10.0.0.2"));
        assert_eq!(limiter.client_key(&req), "198.51.100.4");
        let direct = request([10, 0, 0, 2], None);
        assert_eq!(limiter.client_key(&direct), "10.0.0.2");
    }
}
