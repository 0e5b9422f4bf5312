//! Webhook signature verification.
//!
//! Every verifier works on the raw, unmodified request body and returns
//! `false` on any malformed input instead of erroring.

use {
    ed25519_dalek::{Signature, Verifier, VerifyingKey},
    hmac::{Hmac, Mac},
    http::HeaderMap,
    sha2::Sha256,
    subtle::ConstantTimeEq,
    tracing::debug,
};

use crate::{platform::VerificationScheme, plugin::Credentials};

type HmacSha256 = Hmac<Sha256>;

pub const META_SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const DISCORD_SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const DISCORD_TIMESTAMP_HEADER: &str = "x-signature-timestamp";
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Verify a Meta `X-Hub-Signature-256` header (`sha256=<hex>`, prefix optional).
pub fn verify_meta_signature(signature: Option<&str>, body: &[u8], app_secret: &str) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let digest = signature
        .trim()
        .strip_prefix("sha256=")
        .unwrap_or(signature.trim());
    let Ok(expected) = hex::decode(digest) else {
        debug!("meta signature is not valid hex");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Compute the `sha256=<hex>` header value Meta would send for `body`.
pub fn meta_signature(body: &[u8], app_secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Compare a `hub.verify_token` from a Meta subscription handshake.
pub fn verify_hub_token(presented: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

/// Verify a Discord interaction: Ed25519 over `timestamp || body`.
pub fn verify_discord_signature(
    signature_hex: &str,
    timestamp: &str,
    body: &[u8],
    public_key_hex: &str,
) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex.trim()) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        debug!("discord public key is not a valid curve point");
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    key.verify(&message, &signature).is_ok()
}

/// Telegram path-token check: the bot token must appear in the webhook path.
///
/// Anyone who learns the URL can forge deliveries; prefer the secret-token
/// header when the bot is registered with one.
pub fn verify_telegram_path_token(path: &str, bot_token: &str) -> bool {
    !bot_token.is_empty() && path.contains(bot_token)
}

/// Telegram `X-Telegram-Bot-Api-Secret-Token` check.
pub fn verify_telegram_secret_header(header: Option<&str>, expected: &str) -> bool {
    match header {
        Some(value) if !expected.is_empty() => {
            bool::from(value.as_bytes().ct_eq(expected.as_bytes()))
        },
        _ => false,
    }
}

/// The parts of an inbound request verification looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestAuth<'a> {
    pub headers: &'a HeaderMap,
    pub path: &'a str,
    pub body: &'a [u8],
}

impl<'a> RequestAuth<'a> {
    fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Outcome of checking one plugin's credentials against a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    /// The plugin has no secret for its platform's scheme.
    Unsigned,
    Rejected,
}

/// Check `request` against `credentials` using the platform's scheme.
pub fn verify_request(
    scheme: VerificationScheme,
    credentials: &Credentials,
    request: &RequestAuth<'_>,
) -> Verification {
    let passed = match scheme {
        VerificationScheme::MetaHmac => {
            let Some(secret) = credentials.app_secret() else {
                return Verification::Unsigned;
            };
            verify_meta_signature(request.header(META_SIGNATURE_HEADER), request.body, secret)
        },
        VerificationScheme::DiscordEd25519 => {
            let Some(public_key) = credentials.public_key() else {
                return Verification::Unsigned;
            };
            match (
                request.header(DISCORD_SIGNATURE_HEADER),
                request.header(DISCORD_TIMESTAMP_HEADER),
            ) {
                (Some(sig), Some(ts)) => {
                    verify_discord_signature(sig, ts, request.body, public_key)
                },
                _ => false,
            }
        },
        VerificationScheme::TelegramPathToken => {
            let secret_token = credentials.verify_token();
            let bot_token = credentials.bot_token();
            if secret_token.is_none() && bot_token.is_none() {
                return Verification::Unsigned;
            }
            let header = request.header(TELEGRAM_SECRET_HEADER);
            secret_token.is_some_and(|t| verify_telegram_secret_header(header, t))
                || bot_token.is_some_and(|t| verify_telegram_path_token(request.path, t))
        },
        VerificationScheme::None => return Verification::Unsigned,
    };
    if passed {
        Verification::Verified
    } else {
        Verification::Rejected
    }
}
