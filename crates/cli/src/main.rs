mod config_commands;
mod key_commands;
mod plugin_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    hookgate_config::HookgateConfig,
    hookgate_gateway::{Stores, open_stores},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "hookgate", version, about = "Hookgate: inbound webhook gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of discovering `hookgate.{toml,yaml,json}`.
    #[arg(long, global = true, env = "HOOKGATE_CONFIG")]
    config: Option<PathBuf>,
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server (default when no subcommand is provided).
    Serve,
    /// API key management.
    Keys {
        #[command(subcommand)]
        action: key_commands::KeyAction,
    },
    /// Plugin configuration management.
    Plugins {
        #[command(subcommand)]
        action: plugin_commands::PluginAction,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Config file (explicit or discovered), then `HOOKGATE_*` env, then flags.
fn load_config(cli: &Cli) -> anyhow::Result<HookgateConfig> {
    let mut config = match &cli.config {
        Some(path) => hookgate_config::load_config(path)?,
        None => hookgate_config::discover_and_load(),
    };
    hookgate_config::apply_env_overrides(&mut config);
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

/// Stores for admin commands, which are pointless against memory.
async fn persistent_stores(config: &HookgateConfig) -> anyhow::Result<Stores> {
    if config.database.path.is_none() {
        anyhow::bail!(
            "no database configured; set database.path or HOOKGATE_DATABASE_PATH to manage stored data"
        );
    }
    open_stores(&config.database).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = load_config(&cli)?;

    match cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "hookgate starting");
            hookgate_gateway::start_gateway(config).await
        },
        Some(Commands::Keys { action }) => {
            let stores = persistent_stores(&config).await?;
            key_commands::handle_keys(action, stores.api_keys.as_ref()).await
        },
        Some(Commands::Plugins { action }) => {
            let stores = persistent_stores(&config).await?;
            plugin_commands::handle_plugins(action, stores.plugins.as_ref()).await
        },
        Some(Commands::Config { action }) => config_commands::handle_config(action, config),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::try_parse_from(["hookgate"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "hookgate",
            "keys",
            "create",
            "--user",
            "u1",
            "--port",
            "9000",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.port, Some(9000));
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Some(Commands::Keys { .. })));
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hookgate.toml");
        std::fs::write(&path, "[server]\nbind = \"0.0.0.0\"\nport = 8080\n").unwrap();

        let cli = Cli::try_parse_from([
            "hookgate",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "9100",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let cli = Cli::try_parse_from(["hookgate", "--config", "/nonexistent/hookgate.toml"])
            .unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[tokio::test]
    async fn admin_commands_need_a_database() {
        let mut config = HookgateConfig::default();
        config.database.path = None;
        assert!(persistent_stores(&config).await.is_err());
    }
}
