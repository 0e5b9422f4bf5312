use std::sync::Arc;

use {
    hookgate_auth::{ApiKeyGate, ApiKeyStore, InMemoryApiKeyStore},
    hookgate_channels::{
        InMemoryPluginConfigStore, LogSink, MessageSink, PluginConfig, PluginConfigStore,
        PluginRegistry,
    },
    hookgate_common::time::now_ms,
    hookgate_config::HookgateConfig,
    sqlx::SqlitePool,
    tracing::{info, warn},
};

#[cfg(feature = "metrics")]
use hookgate_metrics::MetricsHandle;

use crate::{
    api_key_store::SqliteApiKeyStore,
    event_store::{EventStore, InMemoryEventStore, SqliteEventStore},
    interaction_store::{InMemoryInteractionStore, InteractionStore, SqliteInteractionStore},
    plugin_factory::{BuiltinPluginFactory, PluginFactory},
    plugin_store::SqlitePluginConfigStore,
    rate_limit::{RateLimitScope, RateLimiter},
    usage_store::{InMemoryUsageStore, SqliteUsageStore, UsageStore},
};

/// The persistence backends the gateway runs against.
#[derive(Clone)]
pub struct Stores {
    pub plugins: Arc<dyn PluginConfigStore>,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub usage: Arc<dyn UsageStore>,
    pub interactions: Arc<dyn InteractionStore>,
    pub events: Arc<dyn EventStore>,
}

impl Stores {
    /// Process-local stores; everything is lost on restart.
    pub fn in_memory() -> Self {
        Self {
            plugins: Arc::new(InMemoryPluginConfigStore::new()),
            api_keys: Arc::new(InMemoryApiKeyStore::new()),
            usage: Arc::new(InMemoryUsageStore::new()),
            interactions: Arc::new(InMemoryInteractionStore::new()),
            events: Arc::new(InMemoryEventStore::new()),
        }
    }

    /// SQLite stores sharing one pool. Run [`crate::run_migrations`] first.
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            plugins: Arc::new(SqlitePluginConfigStore::new(pool.clone())),
            api_keys: Arc::new(SqliteApiKeyStore::new(pool.clone())),
            usage: Arc::new(SqliteUsageStore::new(pool.clone())),
            interactions: Arc::new(SqliteInteractionStore::new(pool.clone())),
            events: Arc::new(SqliteEventStore::new(pool)),
        }
    }
}

/// Shared gateway runtime state, handed to every handler.
pub struct GatewayState {
    pub version: String,
    pub config: HookgateConfig,
    pub registry: PluginRegistry,
    pub factory: Arc<dyn PluginFactory>,
    pub stores: Stores,
    pub key_gate: ApiKeyGate,
    pub sink: Arc<dyn MessageSink>,
    pub http_limiter: Arc<RateLimiter>,
    pub webhook_limiter: Arc<RateLimiter>,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<MetricsHandle>,
}

impl GatewayState {
    pub fn new(config: HookgateConfig, stores: Stores) -> Self {
        let key_gate = ApiKeyGate::new(
            config.auth.default_api_key.clone(),
            Arc::clone(&stores.api_keys),
        );
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            http_limiter: Arc::new(RateLimiter::new(
                RateLimitScope::Http,
                config.rate_limit.http,
            )),
            webhook_limiter: Arc::new(RateLimiter::new(
                RateLimitScope::Webhooks,
                config.rate_limit.webhooks,
            )),
            registry: PluginRegistry::new(),
            factory: Arc::new(BuiltinPluginFactory),
            sink: Arc::new(LogSink),
            key_gate,
            stores,
            config,
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn PluginFactory>) -> Self {
        self.factory = factory;
        self
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn with_metrics_handle(mut self, handle: MetricsHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Persist the config file's `[[plugins]]` seeds, then register every
    /// connected configuration. Configs whose handler cannot be built are
    /// skipped with a warning. Returns the number registered.
    pub async fn load_plugins(&self) -> anyhow::Result<usize> {
        let now = now_ms();
        for seed in self.config.plugins.iter().cloned() {
            let id = seed.id.clone();
            match PluginConfig::from_seed(seed, now) {
                Ok(config) => self.stores.plugins.upsert(config).await?,
                Err(e) => warn!(plugin_id = %id, error = %e, "ignoring invalid plugin seed"),
            }
        }

        let mut registered = 0;
        for config in self.stores.plugins.list_connected().await? {
            let id = config.id.clone();
            let platform = config.platform.clone();
            let plugin = match self.factory.build(config) {
                Ok(plugin) => plugin,
                Err(e) => {
                    warn!(plugin_id = %id, %platform, error = %e, "cannot build plugin, skipping");
                    continue;
                },
            };
            match self.registry.register(plugin).await {
                Ok(()) => registered += 1,
                Err(e) => warn!(plugin_id = %id, error = %e, "plugin not registered"),
            }
        }
        info!(registered, "plugins loaded");
        Ok(registered)
    }
}
