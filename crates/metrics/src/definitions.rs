//! Metric name and label definitions.
//!
//! Every metric emitted by hookgate is named here so dashboards and alerts have
//! a single place to look.

/// HTTP request metrics
pub mod http {
    /// Total number of HTTP requests handled
    pub const REQUESTS_TOTAL: &str = "hookgate_http_requests_total";
    /// Duration of HTTP requests in seconds
    pub const REQUEST_DURATION_SECONDS: &str = "hookgate_http_request_duration_seconds";
}

/// Inbound webhook metrics
pub mod webhooks {
    /// Webhook deliveries received (label: platform, method)
    pub const RECEIVED_TOTAL: &str = "hookgate_webhooks_received_total";
    /// Deliveries claimed by a plugin
    pub const CLAIMED_TOTAL: &str = "hookgate_webhooks_claimed_total";
    /// Deliveries acknowledged without any plugin claiming them
    pub const UNCLAIMED_TOTAL: &str = "hookgate_webhooks_unclaimed_total";
    /// Signature verification failures (label: platform)
    pub const SIGNATURE_FAILURES_TOTAL: &str = "hookgate_webhooks_signature_failures_total";
    /// Verification handshakes (label: platform, success)
    pub const HANDSHAKES_TOTAL: &str = "hookgate_webhooks_handshakes_total";
    /// Plugin `handle_webhook` errors or panics (label: platform)
    pub const PLUGIN_ERRORS_TOTAL: &str = "hookgate_webhooks_plugin_errors_total";
    /// Time spent dispatching a delivery to plugins, in seconds
    pub const DISPATCH_DURATION_SECONDS: &str = "hookgate_webhooks_dispatch_duration_seconds";
}

/// Rate limiter metrics
pub mod rate_limit {
    /// Requests rejected with 429 (label: scope)
    pub const REJECTED_TOTAL: &str = "hookgate_rate_limit_rejected_total";
    /// Records currently tracked (label: scope)
    pub const TRACKED_KEYS: &str = "hookgate_rate_limit_tracked_keys";
    /// Records removed by the idle sweep (label: scope)
    pub const SWEPT_TOTAL: &str = "hookgate_rate_limit_swept_total";
}

/// API key gate metrics
pub mod api_keys {
    /// Successful authentications (label: method = system|user)
    pub const AUTH_SUCCESS_TOTAL: &str = "hookgate_api_keys_auth_success_total";
    /// Rejected authentications (label: reason)
    pub const AUTH_FAILURES_TOTAL: &str = "hookgate_api_keys_auth_failures_total";
    /// Keys minted
    pub const CREATED_TOTAL: &str = "hookgate_api_keys_created_total";
    /// Keys revoked
    pub const REVOKED_TOTAL: &str = "hookgate_api_keys_revoked_total";
}

/// Plugin registry metrics
pub mod plugins {
    /// Number of registered plugins
    pub const REGISTERED: &str = "hookgate_plugins_registered";
}

/// Common label keys
pub mod labels {
    pub const ENDPOINT: &str = "endpoint";
    pub const PLATFORM: &str = "platform";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
    pub const SCOPE: &str = "scope";
    pub const REASON: &str = "reason";
    pub const SUCCESS: &str = "success";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// HTTP request duration buckets (in seconds), 1ms to 30s
    pub static HTTP_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]
    });

    /// Plugin dispatch buckets (in seconds), 100µs to 10s
    pub static DISPATCH_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0,
        ]
    });
}
