use {
    async_trait::async_trait,
    hookgate_common::time::to_rfc3339,
    hookgate_config::PluginSeed,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::info,
};

use crate::{
    Platform,
    error::{Error, Result},
};

/// Whether a configured integration currently receives webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Connected,
    Disconnected,
}

impl PluginStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "connected" => Some(Self::Connected),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

/// Secrets an integration uses to verify inbound deliveries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Credentials {
    /// Meta hub verify token, or Telegram `secret_token`.
    pub verify_token: Option<Secret<String>>,
    /// Meta app secret for `X-Hub-Signature-256`.
    pub app_secret: Option<Secret<String>>,
    /// Telegram bot token.
    pub bot_token: Option<Secret<String>>,
    /// Discord application public key (hex).
    pub public_key: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn verify_token(&self) -> Option<&str> {
        exposed(&self.verify_token)
    }

    #[must_use]
    pub fn app_secret(&self) -> Option<&str> {
        exposed(&self.app_secret)
    }

    #[must_use]
    pub fn bot_token(&self) -> Option<&str> {
        exposed(&self.bot_token)
    }

    #[must_use]
    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref().filter(|k| !k.is_empty())
    }
}

fn exposed(secret: &Option<Secret<String>>) -> Option<&str> {
    secret
        .as_ref()
        .map(|s| s.expose_secret().as_str())
        .filter(|s| !s.is_empty())
}

/// A user's saved integration settings.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub name: String,
    pub credentials: Credentials,
    pub status: PluginStatus,
    pub settings: Value,
    /// Unix milliseconds.
    pub created_at: i64,
    pub updated_at: i64,
}

impl PluginConfig {
    /// Build a connected config from a `[[plugins]]` entry in the config file.
    pub fn from_seed(seed: PluginSeed, now_ms: i64) -> Result<Self> {
        if seed.id.trim().is_empty() {
            return Err(Error::invalid_input("plugin seed is missing an id"));
        }
        let platform: Platform = seed.platform.parse()?;
        Ok(Self {
            name: seed.name.unwrap_or_else(|| platform.to_string()),
            id: seed.id,
            user_id: if seed.user_id.is_empty() {
                "system".into()
            } else {
                seed.user_id
            },
            platform,
            credentials: Credentials {
                verify_token: seed.verify_token,
                app_secret: seed.app_secret,
                bot_token: seed.bot_token,
                public_key: seed.public_key,
            },
            status: PluginStatus::Connected,
            settings: if seed.settings.is_null() {
                Value::Object(Default::default())
            } else {
                seed.settings
            },
            created_at: now_ms,
            updated_at: now_ms,
        })
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == PluginStatus::Connected
    }

    /// Redacted form safe to return from the API.
    #[must_use]
    pub fn view(&self) -> PluginConfigView {
        PluginConfigView {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            platform: self.platform.clone(),
            name: self.name.clone(),
            status: self.status,
            settings: self.settings.clone(),
            has_verify_token: self.credentials.verify_token().is_some(),
            has_app_secret: self.credentials.app_secret().is_some(),
            has_bot_token: self.credentials.bot_token().is_some(),
            public_key: self.credentials.public_key.clone(),
            created_at: to_rfc3339(self.created_at),
            updated_at: to_rfc3339(self.updated_at),
        }
    }
}

/// API representation of a [`PluginConfig`]; secrets become `has_*` flags.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfigView {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub name: String,
    pub status: PluginStatus,
    pub settings: Value,
    pub has_verify_token: bool,
    pub has_app_secret: bool,
    pub has_bot_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A message a plugin extracted from a platform payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub platform: Platform,
    pub plugin_id: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub text: String,
    /// Unix milliseconds.
    pub received_at: i64,
    pub raw: Value,
}

/// Per-platform integration handler.
///
/// `handle_webhook` returns `Ok(Some(_))` to claim a delivery, `Ok(None)` when
/// the payload is not for this plugin (or carries nothing to act on).
#[async_trait]
pub trait WebhookPlugin: Send + Sync {
    fn id(&self) -> &str {
        &self.config().id
    }

    fn config(&self) -> &PluginConfig;

    async fn handle_webhook(&self, payload: &Value) -> Result<Option<InboundMessage>>;
}

/// Receives messages claimed by a plugin. The gateway wires the concrete sink.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: InboundMessage) -> anyhow::Result<()>;
}

/// Sink that records claimed messages in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    async fn deliver(&self, message: InboundMessage) -> anyhow::Result<()> {
        info!(
            platform = %message.platform,
            plugin_id = %message.plugin_id,
            sender_id = %message.sender_id,
            chars = message.text.chars().count(),
            "inbound message"
        );
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_hides_secrets() {
        let cfg = PluginConfig {
            id: "p1".into(),
            user_id: "u1".into(),
            platform: Platform::WhatsApp,
            name: "Support line".into(),
            credentials: Credentials {
                verify_token: Some(Secret::new("tok".into())),
                app_secret: Some(Secret::new(String::new())),
                ..Default::default()
            },
            status: PluginStatus::Connected,
            settings: serde_json::json!({}),
            created_at: 0,
            updated_at: 0,
        };
        let json = serde_json::to_value(cfg.view()).unwrap();
        assert_eq!(json["hasVerifyToken"], true);
        assert_eq!(json["hasAppSecret"], false);
        assert_eq!(json["platform"], "whatsapp");
        assert!(!json.to_string().contains("tok\""));
    }

    #[test]
    fn seed_defaults() {
        let seed = PluginSeed {
            id: "tg".into(),
            platform: "telegram".into(),
            ..Default::default()
        };
        let cfg = PluginConfig::from_seed(seed, 5).unwrap();
        assert_eq!(cfg.platform, Platform::Telegram);
        assert_eq!(cfg.user_id, "system");
        assert_eq!(cfg.name, "telegram");
        assert!(cfg.is_connected());
        assert!(cfg.settings.is_object());
    }

    #[test]
    fn seed_without_id_is_rejected() {
        let seed = PluginSeed {
            platform: "discord".into(),
            ..Default::default()
        };
        assert!(PluginConfig::from_seed(seed, 0).is_err());
    }

    #[test]
    fn credentials_deserialize_from_camel_case() {
        let creds: Credentials =
            serde_json::from_value(serde_json::json!({"appSecret": "s", "publicKey": "ab"}))
                .unwrap();
        assert_eq!(creds.app_secret(), Some("s"));
        assert_eq!(creds.public_key(), Some("ab"));
        assert!(creds.verify_token().is_none());
    }
}
