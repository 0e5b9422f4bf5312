use {
    async_trait::async_trait,
    hookgate_channels::{
        Error, InboundMessage, Platform, PluginConfig, Result, WebhookPlugin, error::Context,
    },
    hookgate_common::time::now_ms,
    serde::Deserialize,
    serde_json::Value,
    tracing::debug,
};

use crate::{
    access::{DmPolicy, check_access},
    types::{Message, Update, User},
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelegramSettings {
    pub dm_policy: DmPolicy,
    /// User IDs or usernames admitted under [`DmPolicy::Allowlist`].
    pub allowlist: Vec<String>,
    /// Group chat IDs the bot answers in. Empty admits all groups.
    pub group_allowlist: Vec<i64>,
}

/// Handles updates for one Telegram bot.
pub struct TelegramPlugin {
    config: PluginConfig,
    settings: TelegramSettings,
}

impl TelegramPlugin {
    pub fn new(config: PluginConfig) -> Result<Self> {
        if config.platform != Platform::Telegram {
            return Err(Error::invalid_input(format!(
                "telegram plugin cannot serve platform {}",
                config.platform
            )));
        }
        let settings = if config.settings.is_null() {
            TelegramSettings::default()
        } else {
            serde_json::from_value(config.settings.clone())?
        };
        Ok(Self { config, settings })
    }

    fn claim(
        &self,
        message: &Message,
        from: Option<&User>,
        text: String,
        raw: &Value,
    ) -> Option<InboundMessage> {
        if from.is_some_and(|u| u.is_bot) {
            return None;
        }
        if let Err(reason) = check_access(
            self.settings.dm_policy,
            &self.settings.allowlist,
            &self.settings.group_allowlist,
            &message.chat,
            from,
        ) {
            debug!(plugin_id = %self.config.id, chat_id = message.chat.id, %reason, "telegram update dropped");
            return None;
        }
        Some(InboundMessage {
            platform: Platform::Telegram,
            plugin_id: self.config.id.clone(),
            sender_id: from
                .map(|u| u.id)
                .unwrap_or(message.chat.id)
                .to_string(),
            sender_name: from.map(User::full_name),
            conversation_id: Some(message.chat.id.to_string()),
            text,
            received_at: now_ms(),
            raw: raw.clone(),
        })
    }
}

#[async_trait]
impl WebhookPlugin for TelegramPlugin {
    fn config(&self) -> &PluginConfig {
        &self.config
    }

    async fn handle_webhook(&self, payload: &Value) -> Result<Option<InboundMessage>> {
        let update: Update = serde_json::from_value(payload.clone())
            .context("malformed telegram update")?;

        if let Some(message) = update.message() {
            let Some(text) = message.body() else {
                debug!(update_id = update.update_id, "ignoring update without text");
                return Ok(None);
            };
            return Ok(self.claim(message, message.from.as_ref(), text.to_string(), payload));
        }

        if let Some(query) = &update.callback_query
            && let (Some(message), Some(data)) = (&query.message, &query.data)
        {
            return Ok(self.claim(message, Some(&query.from), data.clone(), payload));
        }
        Ok(None)
    }
}
