//! Graph API webhook payload shapes.
//!
//! Only the fields the plugin reads are modelled; unknown fields are ignored.

use serde::Deserialize;

/// Top-level webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// `whatsapp_business_account`, `page` or `instagram`.
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    /// WhatsApp business account ID, or the page / IG account ID.
    #[serde(default)]
    pub id: String,
    /// WhatsApp uses `changes`.
    #[serde(default)]
    pub changes: Vec<Change>,
    /// Messenger and Instagram use `messaging`.
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub phone_number_id: String,
    #[serde(default)]
    pub display_phone_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMessage {
    pub from: String,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub message_type: String,
    pub text: Option<TextBody>,
    pub button: Option<ButtonReply>,
    pub interactive: Option<Interactive>,
}

impl WhatsAppMessage {
    /// Text the user typed or the label of the button they pressed.
    pub fn text_body(&self) -> Option<&str> {
        if let Some(text) = &self.text {
            return Some(&text.body);
        }
        if let Some(button) = &self.button {
            return Some(&button.text);
        }
        self.interactive.as_ref().and_then(|i| {
            i.button_reply
                .as_ref()
                .or(i.list_reply.as_ref())
                .map(|r| r.title.as_str())
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonReply {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interactive {
    pub button_reply: Option<InteractiveReply>,
    pub list_reply: Option<InteractiveReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractiveReply {
    pub id: String,
    pub title: String,
}

/// Messenger / Instagram messaging event.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingEvent {
    pub sender: Participant,
    pub recipient: Participant,
    pub message: Option<MessengerMessage>,
    pub postback: Option<Postback>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessengerMessage {
    #[serde(default)]
    pub mid: String,
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postback {
    pub title: Option<String>,
    pub payload: Option<String>,
}
