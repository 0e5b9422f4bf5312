use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use {
    futures::FutureExt,
    serde_json::Value,
    tokio::sync::RwLock,
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use hookgate_metrics::{counter, gauge, labels, plugins as plugin_metrics, webhooks};

use crate::{
    Platform,
    error::{Error, Result},
    plugin::{InboundMessage, PluginConfig, WebhookPlugin},
};

/// Registry of active webhook plugins, grouped by platform in registration
/// order.
#[derive(Default)]
pub struct PluginRegistry {
    by_platform: RwLock<HashMap<Platform, Vec<Arc<dyn WebhookPlugin>>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin. Fails when the ID is already registered.
    pub async fn register(&self, plugin: Arc<dyn WebhookPlugin>) -> Result<()> {
        let mut map = self.by_platform.write().await;
        if map.values().flatten().any(|p| p.id() == plugin.id()) {
            return Err(Error::invalid_input(format!(
                "plugin {} is already registered",
                plugin.id()
            )));
        }
        debug!(plugin_id = plugin.id(), platform = %plugin.config().platform, "registering plugin");
        map.entry(plugin.config().platform.clone())
            .or_default()
            .push(plugin);
        Self::record_len(&map);
        Ok(())
    }

    /// Swap in a rebuilt plugin after reconfiguration.
    ///
    /// The plugin keeps its position when its platform is unchanged; otherwise
    /// (or when it was not registered) it is appended.
    pub async fn replace(&self, plugin: Arc<dyn WebhookPlugin>) {
        let mut map = self.by_platform.write().await;
        let platform = plugin.config().platform.clone();
        let slot = map
            .get_mut(&platform)
            .and_then(|list| list.iter_mut().find(|p| p.id() == plugin.id()));
        if let Some(slot) = slot {
            *slot = plugin;
            return;
        }
        for list in map.values_mut() {
            list.retain(|p| p.id() != plugin.id());
        }
        map.retain(|_, list| !list.is_empty());
        map.entry(platform).or_default().push(plugin);
        Self::record_len(&map);
    }

    /// Remove a plugin by ID. Returns whether anything was removed.
    pub async fn unregister(&self, plugin_id: &str) -> bool {
        let mut map = self.by_platform.write().await;
        let before: usize = map.values().map(Vec::len).sum();
        for list in map.values_mut() {
            list.retain(|p| p.id() != plugin_id);
        }
        map.retain(|_, list| !list.is_empty());
        let removed = map.values().map(Vec::len).sum::<usize>() != before;
        if removed {
            debug!(plugin_id, "unregistered plugin");
            Self::record_len(&map);
        }
        removed
    }

    /// Plugins for `platform` in registration order; empty when none.
    pub async fn plugins_by_platform(&self, platform: &Platform) -> Vec<Arc<dyn WebhookPlugin>> {
        self.by_platform
            .read()
            .await
            .get(platform)
            .cloned()
            .unwrap_or_default()
    }

    /// Configs of every registered plugin.
    pub async fn list(&self) -> Vec<PluginConfig> {
        self.by_platform
            .read()
            .await
            .values()
            .flatten()
            .map(|p| p.config().clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.by_platform.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_len(map: &HashMap<Platform, Vec<Arc<dyn WebhookPlugin>>>) {
        #[cfg(feature = "metrics")]
        gauge!(plugin_metrics::REGISTERED).set(map.values().map(Vec::len).sum::<usize>() as f64);
    }
}

/// A delivery claimed by one plugin.
#[derive(Debug, Clone)]
pub struct Claim {
    pub plugin_id: String,
    pub message: InboundMessage,
}

/// Result of offering a payload to a list of plugins.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub claim: Option<Claim>,
    /// Plugins that returned an error or panicked.
    pub failures: usize,
}

/// Offer `payload` to each plugin in order until one claims it.
///
/// Errors and panics inside a plugin are logged and the next plugin is tried;
/// they never abort the dispatch.
pub async fn dispatch(plugins: &[Arc<dyn WebhookPlugin>], payload: &Value) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();
    for plugin in plugins {
        let result = AssertUnwindSafe(plugin.handle_webhook(payload))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(Some(message))) => {
                debug!(plugin_id = plugin.id(), "plugin claimed webhook");
                outcome.claim = Some(Claim {
                    plugin_id: plugin.id().to_string(),
                    message,
                });
                break;
            },
            Ok(Ok(None)) => {},
            Ok(Err(e)) => {
                warn!(plugin_id = plugin.id(), error = %e, "plugin failed to handle webhook");
                outcome.failures += 1;
                record_failure(&plugin.config().platform);
            },
            Err(_) => {
                error!(plugin_id = plugin.id(), "plugin panicked while handling webhook");
                outcome.failures += 1;
                record_failure(&plugin.config().platform);
            },
        }
    }
    outcome
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_failure(platform: &Platform) {
    #[cfg(feature = "metrics")]
    counter!(webhooks::PLUGIN_ERRORS_TOTAL, labels::PLATFORM => platform.to_string()).increment(1);
}
