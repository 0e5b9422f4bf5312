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

use crate::interaction::{Interaction, InteractionType};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscordSettings {
    /// Only claim interactions for this application.
    pub application_id: Option<String>,
    /// Guild IDs allowed to reach the agent. Empty allows all, DMs included.
    pub guild_allowlist: Vec<String>,
}

/// Handles interactions for one Discord application.
pub struct DiscordPlugin {
    config: PluginConfig,
    settings: DiscordSettings,
}

impl DiscordPlugin {
    pub fn new(config: PluginConfig) -> Result<Self> {
        if config.platform != Platform::Discord {
            return Err(Error::invalid_input(format!(
                "discord plugin cannot serve platform {}",
                config.platform
            )));
        }
        let settings = if config.settings.is_null() {
            DiscordSettings::default()
        } else {
            serde_json::from_value(config.settings.clone())?
        };
        Ok(Self { config, settings })
    }

    fn guild_allowed(&self, guild_id: Option<&str>) -> bool {
        if self.settings.guild_allowlist.is_empty() {
            return true;
        }
        guild_id.is_some_and(|g| self.settings.guild_allowlist.iter().any(|a| a == g))
    }
}

#[async_trait]
impl WebhookPlugin for DiscordPlugin {
    fn config(&self) -> &PluginConfig {
        &self.config
    }

    async fn handle_webhook(&self, payload: &Value) -> Result<Option<InboundMessage>> {
        let interaction: Interaction = serde_json::from_value(payload.clone())
            .context("malformed discord interaction")?;

        if interaction.interaction_type() == InteractionType::Ping {
            return Ok(None);
        }
        if let (Some(expected), Some(actual)) = (
            &self.settings.application_id,
            &interaction.application_id,
        ) && expected != actual
        {
            debug!(plugin_id = %self.config.id, application_id = %actual, "interaction for another application");
            return Ok(None);
        }
        if !self.guild_allowed(interaction.guild_id.as_deref()) {
            debug!(plugin_id = %self.config.id, guild_id = ?interaction.guild_id, "guild not allowlisted");
            return Ok(None);
        }
        let Some(author) = interaction.author().filter(|u| !u.bot) else {
            return Ok(None);
        };
        let Some(text) = interaction.text() else {
            return Ok(None);
        };

        Ok(Some(InboundMessage {
            platform: Platform::Discord,
            plugin_id: self.config.id.clone(),
            sender_id: author.id.clone(),
            sender_name: Some(author.display_name().to_string()),
            conversation_id: interaction.channel_id.clone(),
            text,
            received_at: now_ms(),
            raw: payload.clone(),
        }))
    }
}
