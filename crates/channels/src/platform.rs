//! Supported messaging platforms and their per-platform behaviour tables.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest accepted custom platform identifier.
const MAX_CUSTOM_LEN: usize = 32;

/// A platform that can deliver webhooks.
///
/// Well-known platforms have dedicated handler crates and verification
/// schemes. Any other identifier is a user-defined integration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Platform {
    WhatsApp,
    Messenger,
    Instagram,
    Discord,
    Telegram,
    WordPress,
    Custom(String),
}

/// How a POST delivery proves it came from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationScheme {
    /// `X-Hub-Signature-256: sha256=<hex>` over the raw body, keyed by the app secret.
    MetaHmac,
    /// `X-Signature-Ed25519` over `X-Signature-Timestamp || body`.
    DiscordEd25519,
    /// Bot token embedded in the webhook URL path.
    TelegramPathToken,
    None,
}

/// What a GET request to the webhook endpoint should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Graph API `hub.mode` / `hub.verify_token` / `hub.challenge`.
    MetaHub,
    /// Plain `{status:"ok"}` liveness ping used by the site widget.
    WordPressPing,
    Generic,
}

impl Platform {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Messenger => "messenger",
            Self::Instagram => "instagram",
            Self::Discord => "discord",
            Self::Telegram => "telegram",
            Self::WordPress => "wordpress",
            Self::Custom(name) => name,
        }
    }

    #[must_use]
    pub fn verification_scheme(&self) -> VerificationScheme {
        match self {
            Self::WhatsApp | Self::Messenger | Self::Instagram => VerificationScheme::MetaHmac,
            Self::Discord => VerificationScheme::DiscordEd25519,
            Self::Telegram => VerificationScheme::TelegramPathToken,
            Self::WordPress | Self::Custom(_) => VerificationScheme::None,
        }
    }

    #[must_use]
    pub fn handshake(&self) -> Handshake {
        match self {
            Self::WhatsApp | Self::Messenger | Self::Instagram => Handshake::MetaHub,
            Self::WordPress => Handshake::WordPressPing,
            Self::Discord | Self::Telegram | Self::Custom(_) => Handshake::Generic,
        }
    }

    /// Platforms served by the Meta Graph API.
    #[must_use]
    pub fn is_meta(&self) -> bool {
        matches!(self, Self::WhatsApp | Self::Messenger | Self::Instagram)
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.to_ascii_lowercase();
        let platform = match name.as_str() {
            "whatsapp" => Self::WhatsApp,
            "messenger" => Self::Messenger,
            "instagram" => Self::Instagram,
            "discord" => Self::Discord,
            "telegram" => Self::Telegram,
            "wordpress" => Self::WordPress,
            _ if is_custom_identifier(&name) => Self::Custom(name),
            _ => return Err(Error::invalid_platform(s)),
        };
        Ok(platform)
    }
}

fn is_custom_identifier(name: &str) -> bool {
    (1..=MAX_CUSTOM_LEN).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

impl TryFrom<String> for Platform {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(value: Platform) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
