use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota};

use crate::errors::{AppError, ErrorCode};

/// Per-IP limiter: a burst of `max_requests`, refilled evenly over `window`.
///
/// Keys default to the socket peer. `X-Forwarded-For` is only consulted when
/// a trusted proxy depth is configured.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
    trusted_proxy_depth: usize,
}

struct Inner {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    message: String,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, message: impl Into<String>) -> Self {
        let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            inner: Arc::new(Inner {
                limiter: governor::RateLimiter::keyed(quota),
                message: message.into(),
            }),
            trusted_proxy_depth: 0,
        }
    }

    /// Number of reverse proxies whose `X-Forwarded-For` entries are trusted.
    pub fn with_trusted_proxy_depth(mut self, depth: usize) -> Self {
        self.trusted_proxy_depth = depth;
        self
    }

    /// Record a hit for `ip`; `false` once its burst is spent.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.inner.limiter.check_key(&ip).is_ok()
    }

    /// Forget addresses whose allowance has fully refilled; returns how many remain.
    pub fn prune(&self) -> usize {
        self.inner.limiter.retain_recent();
        self.inner.limiter.shrink_to_fit();
        self.inner.limiter.len()
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }
}

/// Client address for rate limiting.
///
/// With `trusted_proxy_depth == 0` only the socket peer counts. Otherwise the
/// entry appended by the outermost trusted proxy is used, i.e. the
/// `depth`-th entry from the end of `X-Forwarded-For`. Entries to its left
/// are client-controlled.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_proxy_depth: usize) -> IpAddr {
    let peer_ip = peer.map(|addr| addr.ip()).unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    if trusted_proxy_depth == 0 {
        return peer_ip;
    }

    let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) else {
        return peer_ip;
    };
    let ips: Vec<&str> = forwarded.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if ips.len() < trusted_proxy_depth {
        return peer_ip;
    }

    ips[ips.len() - trusted_proxy_depth].parse().unwrap_or(peer_ip)
}

/// Axum middleware; attach with `middleware::from_fn_with_state(limiter, rate_limit)`.
pub async fn rate_limit(State(limiter): State<RateLimiter>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer, limiter.trusted_proxy_depth);

    if !limiter.check(ip) {
        tracing::warn!(ip = %ip, path = %req.uri().path(), "rate limit exceeded");
        return AppError::new(ErrorCode::RateLimited, limiter.message()).into_response();
    }

    next.run(req).await
}
