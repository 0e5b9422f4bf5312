//! Configuration loading and env substitution.
//!
//! Config files: `hookgate.toml`, `hookgate.yaml`, or `hookgate.json`
//! Searched in `./` then `~/.config/hookgate/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        AuthConfig, DatabaseConfig, EmbedConfig, HookgateConfig, MAX_WINDOW_SECS, MetricsConfig,
        PluginSeed, RateLimitConfig, ServerConfig, WebhooksConfig, WindowLimit,
    },
};
