//! Per-client rate limiting using a keyed token bucket
//!
//! Only the `/v1` API sits behind this layer. Health checks and signed
//! gateway callbacks are never throttled.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use paperdesk_common::errors::AppError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

/// One token bucket per client IP
pub type ClientRateLimiter = DefaultKeyedRateLimiter<IpAddr>;

/// Create a new rate limiter; zero values are raised to one
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Arc<ClientRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);
    let quota = Quota::per_second(rate).allow_burst(burst);

    Arc::new(RateLimiter::keyed(quota))
}

/// Peer address from the listener, else the first `X-Forwarded-For` hop
pub fn client_ip(request: &Request) -> IpAddr {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<ClientRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(&request);

    match limiter.check_key(&ip) {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(client = %ip, path = %request.uri().path(), "Rate limit exceeded");
            Err(AppError::RateLimited)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = create_rate_limiter(100, 200);
        assert!(limiter.check_key(&ip("10.0.0.1")).is_ok());
    }

    #[test]
    fn test_burst_exhaustion_is_per_client() {
        let limiter = create_rate_limiter(1, 2);
        let noisy = ip("10.0.0.1");
        assert!(limiter.check_key(&noisy).is_ok());
        assert!(limiter.check_key(&noisy).is_ok());
        assert!(limiter.check_key(&noisy).is_err());

        assert!(limiter.check_key(&ip("10.0.0.2")).is_ok());
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let limiter = create_rate_limiter(0, 0);
        assert!(limiter.check_key(&ip("10.0.0.1")).is_ok());
    }

    #[test]
    fn test_client_ip_sources() {
        let mut request = Request::new(Body::empty());
        assert_eq!(client_ip(&request), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        request
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&request), ip("203.0.113.7"));

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_ip(&request), ip("192.0.2.1"));
    }
}
