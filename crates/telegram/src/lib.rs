//! Telegram plugin for hookgate.
//!
//! Reads Bot API `Update` objects delivered by `setWebhook`. The bot token or
//! `secret_token` check is done by the gateway.

pub mod access;
pub mod plugin;
pub mod types;

pub use plugin::{TelegramPlugin, TelegramSettings};
