//! Webhook plugin system.
//!
//! A [`Platform`] names where a delivery comes from, a [`WebhookPlugin`]
//! interprets that platform's payloads for one user's integration, and the
//! [`PluginRegistry`] maps platforms to their active plugins. [`verify`] holds
//! the per-platform signature checks run before a payload reaches a plugin.

pub mod error;
pub mod platform;
pub mod plugin;
pub mod registry;
pub mod store;
pub mod verify;

pub use {
    error::{Error, Result},
    platform::{Handshake, Platform, VerificationScheme},
    plugin::{
        Credentials, InboundMessage, LogSink, MessageSink, PluginConfig, PluginConfigView,
        PluginStatus, WebhookPlugin,
    },
    registry::{Claim, DispatchOutcome, PluginRegistry, dispatch},
    store::{InMemoryPluginConfigStore, PluginConfigStore},
    verify::{RequestAuth, Verification, verify_request},
};
