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

use crate::types::{Entry, MessagingEvent, WebhookPayload};

/// Per-integration settings read from the plugin config's `settings` object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetaSettings {
    /// Only claim WhatsApp deliveries for this phone number ID.
    pub phone_number_id: Option<String>,
    /// Only claim Messenger / Instagram deliveries for this page or account.
    pub page_id: Option<String>,
}

/// Handles Graph API deliveries for one WhatsApp number, page or IG account.
pub struct MetaPlugin {
    config: PluginConfig,
    settings: MetaSettings,
}

impl MetaPlugin {
    pub fn new(config: PluginConfig) -> Result<Self> {
        if !config.platform.is_meta() {
            return Err(Error::invalid_input(format!(
                "meta plugin cannot serve platform {}",
                config.platform
            )));
        }
        let settings = if config.settings.is_null() {
            MetaSettings::default()
        } else {
            serde_json::from_value(config.settings.clone())?
        };
        Ok(Self { config, settings })
    }

    fn expected_object(&self) -> &'static str {
        match self.config.platform {
            Platform::Messenger => "page",
            Platform::Instagram => "instagram",
            _ => "whatsapp_business_account",
        }
    }

    fn message(
        &self,
        sender_id: &str,
        sender_name: Option<String>,
        conversation_id: &str,
        text: &str,
        raw: &Value,
    ) -> InboundMessage {
        InboundMessage {
            platform: self.config.platform.clone(),
            plugin_id: self.config.id.clone(),
            sender_id: sender_id.to_string(),
            sender_name,
            conversation_id: Some(conversation_id.to_string()),
            text: text.to_string(),
            received_at: now_ms(),
            raw: raw.clone(),
        }
    }

    fn from_changes(&self, entry: &Entry, raw: &Value) -> Option<InboundMessage> {
        for change in entry.changes.iter().filter(|c| c.field == "messages") {
            let value = &change.value;
            if let (Some(expected), Some(metadata)) =
                (&self.settings.phone_number_id, &value.metadata)
                && &metadata.phone_number_id != expected
            {
                debug!(
                    plugin_id = %self.config.id,
                    received = %metadata.phone_number_id,
                    "phone number ID mismatch"
                );
                continue;
            }
            for msg in &value.messages {
                let Some(text) = msg.text_body().filter(|t| !t.trim().is_empty()) else {
                    debug!(msg_type = %msg.message_type, "ignoring non-text whatsapp message");
                    continue;
                };
                let sender_name = value
                    .contacts
                    .iter()
                    .find(|c| c.wa_id == msg.from)
                    .and_then(|c| c.profile.as_ref())
                    .map(|p| p.name.clone());
                return Some(self.message(&msg.from, sender_name, &msg.from, text, raw));
            }
        }
        None
    }

    fn from_messaging(&self, entry: &Entry, raw: &Value) -> Option<InboundMessage> {
        if let Some(page_id) = &self.settings.page_id
            && &entry.id != page_id
        {
            return None;
        }
        entry
            .messaging
            .iter()
            .find_map(|event| self.messaging_text(event).map(|t| (event, t)))
            .map(|(event, text)| {
                self.message(&event.sender.id, None, &event.sender.id, text, raw)
            })
    }

    fn messaging_text<'a>(&self, event: &'a MessagingEvent) -> Option<&'a str> {
        if let Some(message) = &event.message {
            if message.is_echo {
                return None;
            }
            return message.text.as_deref().filter(|t| !t.trim().is_empty());
        }
        event
            .postback
            .as_ref()
            .and_then(|p| p.title.as_deref().or(p.payload.as_deref()))
    }
}

#[async_trait]
impl WebhookPlugin for MetaPlugin {
    fn config(&self) -> &PluginConfig {
        &self.config
    }

    async fn handle_webhook(&self, payload: &Value) -> Result<Option<InboundMessage>> {
        let body: WebhookPayload = serde_json::from_value(payload.clone())
            .context("malformed graph api payload")?;
        if body.object != self.expected_object() {
            debug!(plugin_id = %self.config.id, object = %body.object, "unexpected payload object");
            return Ok(None);
        }
        Ok(body.entry.iter().find_map(|entry| {
            if self.config.platform == Platform::WhatsApp {
                self.from_changes(entry, payload)
            } else {
                self.from_messaging(entry, payload)
            }
        }))
    }
}
