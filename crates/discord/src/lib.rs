//! Discord plugin for hookgate.
//!
//! Receives interactions posted to the application's Interactions Endpoint
//! URL. Signature checks happen in the gateway before the plugin runs.

pub mod interaction;
pub mod plugin;

pub use {
    interaction::{Interaction, InteractionType, is_ping},
    plugin::{DiscordPlugin, DiscordSettings},
};
