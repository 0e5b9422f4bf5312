//! Builds the handler for a stored plugin configuration.

use std::sync::Arc;

use {
    async_trait::async_trait,
    hookgate_channels::{InboundMessage, Platform, PluginConfig, Result, WebhookPlugin},
    hookgate_common::time::now_ms,
    hookgate_discord::DiscordPlugin,
    hookgate_meta::MetaPlugin,
    hookgate_telegram::TelegramPlugin,
    hookgate_wordpress::WordPressPlugin,
    serde_json::Value,
};

/// Turns a [`PluginConfig`] into a live handler. Fails when the config's
/// settings are invalid for its platform.
pub trait PluginFactory: Send + Sync {
    fn build(&self, config: PluginConfig) -> Result<Arc<dyn WebhookPlugin>>;
}

/// Maps every known platform to its handler crate; custom platforms get a
/// [`GenericPlugin`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinPluginFactory;

impl PluginFactory for BuiltinPluginFactory {
    fn build(&self, config: PluginConfig) -> Result<Arc<dyn WebhookPlugin>> {
        Ok(match config.platform {
            Platform::WhatsApp | Platform::Messenger | Platform::Instagram => {
                Arc::new(MetaPlugin::new(config)?)
            },
            Platform::Discord => Arc::new(DiscordPlugin::new(config)?),
            Platform::Telegram => Arc::new(TelegramPlugin::new(config)?),
            Platform::WordPress => Arc::new(WordPressPlugin::new(config)?),
            Platform::Custom(_) => Arc::new(GenericPlugin::new(config)),
        })
    }
}

/// Handler for user-defined platforms.
///
/// Claims JSON objects carrying a non-empty `message` or `text` string. The
/// sender comes from `senderId`, `userId` or `sender`, defaulting to
/// `anonymous`.
pub struct GenericPlugin {
    config: PluginConfig,
}

impl GenericPlugin {
    pub fn new(config: PluginConfig) -> Self {
        Self { config }
    }
}

fn str_field<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

#[async_trait]
impl WebhookPlugin for GenericPlugin {
    fn config(&self) -> &PluginConfig {
        &self.config
    }

    async fn handle_webhook(&self, payload: &Value) -> Result<Option<InboundMessage>> {
        let Some(text) = str_field(payload, &["message", "text"]) else {
            return Ok(None);
        };
        let sender_id = str_field(payload, &["senderId", "userId", "sender"]).unwrap_or("anonymous");

        Ok(Some(InboundMessage {
            platform: self.config.platform.clone(),
            plugin_id: self.config.id.clone(),
            sender_id: sender_id.to_string(),
            sender_name: str_field(payload, &["senderName"]).map(str::to_string),
            conversation_id: str_field(payload, &["conversationId"]).map(str::to_string),
            text: text.to_string(),
            received_at: now_ms(),
            raw: payload.clone(),
        }))
    }
}
