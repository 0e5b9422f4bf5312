//! Fixed-window, per-client-IP rate limiting.
//!
//! Two independent [`RateLimiter`]s run in the gateway: a broad one over every
//! route and a tighter one over `/webhooks/*`. Each keeps one record per
//! client IP; an hourly sweep drops records that have been idle for two full
//! windows.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use {
    axum::{
        body::Body,
        extract::{ConnectInfo, State},
        http::{HeaderMap, HeaderValue, Request, StatusCode, header},
        middleware::Next,
        response::{IntoResponse, Json, Response},
    },
    dashmap::DashMap,
    hookgate_config::WindowLimit,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use hookgate_metrics::{counter, gauge, labels, rate_limit as rl_metrics};

use crate::server::AppState;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Which limiter a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    Http,
    Webhooks,
}

impl RateLimitScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Webhooks => "webhooks",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    count: u32,
    reset_at: Instant,
}

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_in: Duration,
}

impl RateLimitDecision {
    /// Seconds until the window resets, rounded up.
    #[must_use]
    pub fn reset_in_secs(&self) -> u64 {
        self.reset_in.as_secs() + u64::from(self.reset_in.subsec_nanos() > 0)
    }
}

pub struct RateLimiter {
    scope: RateLimitScope,
    max_requests: u32,
    window: Duration,
    records: DashMap<IpAddr, WindowRecord>,
    sweeper_started: AtomicBool,
}

impl RateLimiter {
    #[must_use]
    pub fn new(scope: RateLimitScope, limit: WindowLimit) -> Self {
        Self {
            scope,
            max_requests: limit.max_requests,
            window: limit.window(),
            records: DashMap::new(),
            sweeper_started: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> RateLimitScope {
        self.scope
    }

    pub fn check(&self, ip: IpAddr) -> RateLimitDecision {
        self.check_at(ip, Instant::now())
    }

    /// Count a request from `ip` at `now`. The count always increments, so a
    /// client that keeps hammering stays denied until the window resets.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> RateLimitDecision {
        let reset_at = now.checked_add(self.window).unwrap_or(now);
        let mut record = self.records.entry(ip).or_insert(WindowRecord {
            count: 0,
            reset_at,
        });
        if now > record.reset_at {
            record.count = 0;
            record.reset_at = reset_at;
        }
        record.count = record.count.saturating_add(1);

        RateLimitDecision {
            allowed: record.count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(record.count),
            reset_in: record.reset_at.saturating_duration_since(now),
        }
    }

    /// Drop records idle for more than two windows past their reset.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let idle_after = self.window.saturating_mul(2);
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = record
                .reset_at
                .checked_add(idle_after)
                .is_none_or(|idle_at| now <= idle_at);
            if !keep {
                removed += 1;
            }
            keep
        });

        #[cfg(feature = "metrics")]
        {
            let scope = self.scope.as_str();
            counter!(rl_metrics::SWEPT_TOTAL, labels::SCOPE => scope).increment(removed as u64);
            gauge!(rl_metrics::TRACKED_KEYS, labels::SCOPE => scope).set(self.records.len() as f64);
        }
        removed
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }

    /// Spawn the periodic sweep. Only the first call per limiter starts a
    /// task; it stops once the limiter is dropped.
    pub fn start_sweeper(self: &Arc<Self>, every: Duration) -> bool {
        if self.sweeper_started.swap(true, Ordering::AcqRel) {
            return false;
        }
        let limiter = Arc::downgrade(self);
        let scope = self.scope;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let removed = limiter.sweep_at(Instant::now());
                debug!(scope = scope.as_str(), removed, tracked = limiter.tracked(), "rate limit sweep");
            }
            debug!(scope = scope.as_str(), "rate limit sweeper stopped");
        });
        true
    }
}

/// Broad limiter applied to every route.
pub async fn http_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let limiter = Arc::clone(&state.gateway.http_limiter);
    enforce(&state, &limiter, request, next).await
}

/// Per-IP limiter applied to `/webhooks/*`.
pub async fn webhook_rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let limiter = Arc::clone(&state.gateway.webhook_limiter);
    enforce(&state, &limiter, request, next).await
}

async fn enforce(
    state: &AppState,
    limiter: &RateLimiter,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.gateway.config.rate_limit.enabled {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = resolve_client_ip(
        request.headers(),
        peer,
        state.gateway.config.server.behind_proxy,
    );

    let decision = limiter.check(client_ip);
    if !decision.allowed {
        warn!(
            scope = limiter.scope().as_str(),
            ip = %client_ip,
            path = request.uri().path(),
            "rate limit exceeded"
        );
        #[cfg(feature = "metrics")]
        counter!(rl_metrics::REJECTED_TOTAL, labels::SCOPE => limiter.scope().as_str())
            .increment(1);
        return rate_limited_response(&decision);
    }

    let mut response = next.run(request).await;
    // An inner (more specific) limiter has already reported its own numbers.
    let headers = response.headers_mut();
    if !headers.contains_key(LIMIT_HEADER) {
        insert_limit_headers(headers, &decision);
    }
    response
}

fn insert_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_in_secs()));
}

fn rate_limited_response(decision: &RateLimitDecision) -> Response {
    let retry_after = decision.reset_in_secs().max(1);
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "Too many requests, please try again later",
            "retryAfter": retry_after,
        })),
    )
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    insert_limit_headers(headers, decision);
    response
}

fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, behind_proxy: bool) -> IpAddr {
    if behind_proxy && let Some(ip) = extract_forwarded_ip(headers) {
        return ip;
    }
    peer.map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |addr| addr.ip())
}

fn extract_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header_str("x-forwarded-for")
        .and_then(|xff| xff.split(',').find_map(|c| parse_ip(c.trim())))
        .or_else(|| header_str("x-real-ip").and_then(|v| parse_ip(v.trim())))
        .or_else(|| header_str("cf-connecting-ip").and_then(|v| parse_ip(v.trim())))
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    if value.is_empty() {
        return None;
    }
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitScope::Webhooks, WindowLimit {
            max_requests,
            window_secs,
        })
    }

    #[test]
    fn first_n_allowed_then_denied() {
        let limiter = limiter(3, 60);
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let d = limiter.check_at(IP, now);
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }

        let denied = limiter.check_at(IP, now);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.limit, 3);
        assert_eq!(denied.reset_in_secs(), 60);
    }

    #[test]
    fn huge_windows_do_not_overflow() {
        let limiter = limiter(1, u64::MAX);
        let now = Instant::now();
        assert!(limiter.check_at(IP, now).allowed);
        let denied = limiter.check_at(IP, now);
        assert!(!denied.allowed);
        assert_eq!(
            denied.reset_in_secs(),
            hookgate_config::MAX_WINDOW_SECS
        );
        assert_eq!(limiter.sweep_at(now + Duration::from_secs(60)), 0);
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = limiter(1, 10);
        let now = Instant::now();
        assert!(limiter.check_at(IP, now).allowed);
        assert!(!limiter.check_at(IP, now + Duration::from_secs(5)).allowed);

        let after = limiter.check_at(IP, now + Duration::from_secs(11));
        assert!(after.allowed);
        assert_eq!(after.remaining, 0);
        assert_eq!(after.reset_in_secs(), 10);
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.check_at(IP, now).allowed);
        assert!(limiter.check_at(IpAddr::V4(Ipv4Addr::LOCALHOST), now).allowed);
        assert!(!limiter.check_at(IP, now).allowed);
    }

    #[test]
    fn reset_rounds_up() {
        let limiter = limiter(5, 60);
        let now = Instant::now();
        limiter.check_at(IP, now);
        let d = limiter.check_at(IP, now + Duration::from_millis(500));
        assert_eq!(d.reset_in_secs(), 60);
    }

    #[test]
    fn sweep_drops_only_long_idle_records() {
        let limiter = limiter(5, 10);
        let now = Instant::now();
        limiter.check_at(IP, now);
        limiter.check_at(IpAddr::V4(Ipv4Addr::LOCALHOST), now + Duration::from_secs(25));

        // IP reset at +10s, idle threshold +30s; localhost reset at +35s.
        assert_eq!(limiter.sweep_at(now + Duration::from_secs(30)), 0);
        assert_eq!(limiter.sweep_at(now + Duration::from_secs(31)), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[tokio::test]
    async fn sweeper_starts_once() {
        let limiter = Arc::new(limiter(5, 10));
        assert!(limiter.start_sweeper(Duration::from_secs(3600)));
        assert!(!limiter.start_sweeper(Duration::from_secs(3600)));
    }

    #[test]
    fn limited_response_carries_retry_after() {
        let limiter = limiter(1, 30);
        let now = Instant::now();
        limiter.check_at(IP, now);
        let response = rate_limited_response(&limiter.check_at(IP, now));

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
        assert_eq!(response.headers()[REMAINING_HEADER], "0");
    }

    #[rstest]
    #[case("203.0.113.1, 198.51.100.9", None, Some("203.0.113.1"))]
    #[case("garbage, 198.51.100.9", None, Some("198.51.100.9"))]
    #[case("", Some("192.0.2.4"), Some("192.0.2.4"))]
    #[case("", None, None)]
    fn forwarded_ip_precedence(
        #[case] xff: &str,
        #[case] real_ip: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let mut headers = HeaderMap::new();
        if !xff.is_empty() {
            headers.insert("x-forwarded-for", HeaderValue::from_str(xff).unwrap());
        }
        if let Some(real_ip) = real_ip {
            headers.insert("x-real-ip", HeaderValue::from_str(real_ip).unwrap());
        }
        assert_eq!(
            extract_forwarded_ip(&headers),
            expected.map(|ip| ip.parse().unwrap())
        );
    }

    #[test]
    fn proxy_headers_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.1"));
        let peer = Some(SocketAddr::from(([10, 0, 0, 1], 4000)));

        assert_eq!(
            resolve_client_ip(&headers, peer, false),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
        );
        assert_eq!(
            resolve_client_ip(&headers, peer, true),
            IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1))
        );
    }
}
