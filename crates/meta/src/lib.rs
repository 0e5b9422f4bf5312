//! Meta platform plugin for hookgate.
//!
//! One plugin type serves WhatsApp Cloud API, Messenger and Instagram
//! deliveries; the configured platform picks which payload object is expected.

pub mod plugin;
pub mod types;

pub use plugin::{MetaPlugin, MetaSettings};
