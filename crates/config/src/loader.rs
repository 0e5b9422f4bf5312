use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::HookgateConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "hookgate.toml",
    "hookgate.yaml",
    "hookgate.yml",
    "hookgate.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<HookgateConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./hookgate.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/hookgate/hookgate.{toml,yaml,yml,json}` (user-global)
///
/// Returns `HookgateConfig::default()` if no config file is found.
pub fn discover_and_load() -> HookgateConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    HookgateConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/hookgate/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "hookgate").map(|d| d.config_dir().to_path_buf())
}

/// Apply `HOOKGATE_*` environment overrides on top of a loaded config.
///
/// `DEFAULT_API_KEY` is honoured as a fallback for the system key so existing
/// deployments keep working.
pub fn apply_env_overrides(config: &mut HookgateConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut HookgateConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup("HOOKGATE_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("HOOKGATE_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid HOOKGATE_PORT"),
        }
    }
    if let Some(key) = lookup("HOOKGATE_DEFAULT_API_KEY").or_else(|| lookup("DEFAULT_API_KEY"))
        && !key.is_empty()
    {
        config.auth.default_api_key = Some(Secret::new(key));
    }
    if let Some(url) = lookup("HOOKGATE_APP_URL").filter(|u| !u.is_empty()) {
        config.embed.app_url = url;
    }
    if let Some(path) = lookup("HOOKGATE_DATABASE_PATH") {
        config.database.path = match path.as_str() {
            "" | ":memory:" => None,
            _ => Some(PathBuf::from(path)),
        };
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<HookgateConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hookgate.yaml");
        std::fs::write(
            &path,
            "server:\n  port: 9000\nwebhooks:\n  require_signatures: true\n",
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert!(cfg.webhooks.require_signatures);
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hookgate.json");
        std::fs::write(&path, r#"{"server": {"bind": "127.0.0.1"}}"#).unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hookgate.ini");
        std::fs::write(&path, "port=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = HookgateConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "HOOKGATE_PORT" => Some("4000".into()),
            "DEFAULT_API_KEY" => Some("legacy".into()),
            "HOOKGATE_DATABASE_PATH" => Some(":memory:".into()),
            "HOOKGATE_APP_URL" => Some("https://app.example.com/".into()),
            _ => None,
        });
        assert_eq!(cfg.server.port, 4000);
        assert_eq!(
            cfg.embed.script_url(),
            "https://app.example.com/api/embed/enhanced-chatbot.js"
        );
        assert_eq!(
            cfg.auth.default_api_key.unwrap().expose_secret(),
            "legacy"
        );
        assert!(cfg.database.path.is_none());
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut cfg = HookgateConfig::default();
        apply_env_overrides_with(&mut cfg, |name| {
            (name == "HOOKGATE_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(cfg.server.port, 3002);
    }

    #[test]
    fn prefixed_key_wins_over_legacy() {
        let mut cfg = HookgateConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "HOOKGATE_DEFAULT_API_KEY" => Some("new".into()),
            "DEFAULT_API_KEY" => Some("old".into()),
            _ => None,
        });
        assert_eq!(cfg.auth.default_api_key.unwrap().expose_secret(), "new");
    }
}
