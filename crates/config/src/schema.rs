/// Config schema types (server, rate limits, webhooks, auth, storage, plugins).
use std::{collections::HashMap, path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HookgateConfig {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub webhooks: WebhooksConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub metrics: MetricsConfig,
    pub embed: EmbedConfig,
    /// Integrations registered at startup in addition to those persisted in
    /// the database. Useful for static single-tenant deployments.
    pub plugins: Vec<PluginSeed>,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "0.0.0.0".
    pub bind: String,
    /// Port to listen on. Defaults to 3002.
    pub port: u16,
    /// Trust `X-Forwarded-For` / `X-Real-IP` / `CF-Connecting-IP` for the
    /// client address used by rate limiting.
    pub behind_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3002,
            behind_proxy: false,
        }
    }
}

/// A single fixed-window limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Longest accepted window: one year.
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

impl WindowLimit {
    /// The window length, clamped to `1..=MAX_WINDOW_SECS` seconds.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs.clamp(1, MAX_WINDOW_SECS))
    }
}

/// Rate limiting configuration. Both limiters apply independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Disable all rate limiting (tests, trusted networks).
    pub enabled: bool,
    /// Broad limiter applied to every route.
    pub http: WindowLimit,
    /// Per-IP limiter applied to `/webhooks/*`.
    pub webhooks: WindowLimit,
    /// How often idle records are purged.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            http: WindowLimit {
                max_requests: 100,
                window_secs: 15 * 60,
            },
            webhooks: WindowLimit {
                max_requests: 60,
                window_secs: 60,
            },
            sweep_interval_secs: 60 * 60,
        }
    }
}

/// Webhook dispatch behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhooksConfig {
    /// Reject POST deliveries for plugins that have no signing secret
    /// configured for their platform's verification scheme.
    pub require_signatures: bool,
    /// Answer 200 `{success:false}` instead of 404 when a platform has no
    /// registered plugins, so the sending platform keeps the subscription.
    pub acknowledge_unconfigured: bool,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            require_signatures: false,
            acknowledge_unconfigured: true,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// API key authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Process-wide system key. Callers presenting it act as the system
    /// identity and bypass per-user ownership checks.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_api_key: Option<Secret<String>>,
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("hookgate.db")),
        }
    }
}

/// Metrics and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled.
    pub enabled: bool,
    /// Whether to expose the `/metrics` Prometheus endpoint.
    pub prometheus_endpoint: bool,
    /// Additional labels attached to every metric.
    pub labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prometheus_endpoint: true,
            labels: HashMap::new(),
        }
    }
}

/// Website chat widget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Public origin of the app serving the widget script.
    pub app_url: String,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:3000".into(),
        }
    }
}

impl EmbedConfig {
    /// URL of the widget script referenced by generated embed snippets.
    #[must_use]
    pub fn script_url(&self) -> String {
        format!(
            "{}/api/embed/enhanced-chatbot.js",
            self.app_url.trim_end_matches('/')
        )
    }
}

/// A plugin declared in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSeed {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub name: Option<String>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub verify_token: Option<Secret<String>>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub app_secret: Option<Secret<String>>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub bot_token: Option<Secret<String>>,
    pub public_key: Option<String>,
    pub settings: serde_json::Value,
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let cfg = HookgateConfig::default();
        assert_eq!(cfg.server.port, 3002);
        assert_eq!(cfg.rate_limit.http.max_requests, 100);
        assert_eq!(cfg.rate_limit.http.window(), Duration::from_secs(900));
        assert_eq!(cfg.rate_limit.webhooks.max_requests, 60);
        assert_eq!(cfg.rate_limit.webhooks.window(), Duration::from_secs(60));
        assert!(cfg.webhooks.acknowledge_unconfigured);
        assert!(!cfg.webhooks.require_signatures);
        assert!(cfg.auth.default_api_key.is_none());
        assert_eq!(
            cfg.embed.script_url(),
            "http://localhost:3000/api/embed/enhanced-chatbot.js"
        );
    }

    #[test]
    fn window_is_clamped() {
        let limit = |window_secs| WindowLimit {
            max_requests: 1,
            window_secs,
        };
        assert_eq!(limit(0).window(), Duration::from_secs(1));
        assert_eq!(limit(u64::MAX).window(), Duration::from_secs(MAX_WINDOW_SECS));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: HookgateConfig = toml::from_str(
            r#"
            [server]
            port = 8080

            [rate_limit.webhooks]
            max_requests = 5
            window_secs = 10

            [auth]
            default_api_key = "sys-key"

            [[plugins]]
            id = "wa-main"
            user_id = "u1"
            platform = "whatsapp"
            verify_token = "tok"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.rate_limit.webhooks.max_requests, 5);
        assert_eq!(cfg.rate_limit.http.max_requests, 100);
        assert_eq!(
            cfg.auth.default_api_key.as_ref().unwrap().expose_secret(),
            "sys-key"
        );
        assert_eq!(cfg.plugins.len(), 1);
        assert_eq!(
            cfg.plugins[0].verify_token.as_ref().unwrap().expose_secret(),
            "tok"
        );
    }

    #[test]
    fn zero_window_is_clamped() {
        let limit = WindowLimit {
            max_requests: 1,
            window_secs: 0,
        };
        assert_eq!(limit.window(), Duration::from_secs(1));
    }
}
