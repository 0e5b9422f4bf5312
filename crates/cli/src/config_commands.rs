use {
    anyhow::Result,
    clap::{Subcommand, ValueEnum},
    hookgate_config::HookgateConfig,
    secrecy::Secret,
    serde_json::Value,
};

const MASK: &str = "********";

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (file, env and flags applied).
    Show {
        #[arg(long, value_enum, default_value_t = Format::Toml)]
        format: Format,
        /// Print secrets instead of masking them.
        #[arg(long)]
        show_secrets: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Format {
    Toml,
    Json,
}

pub fn handle_config(action: ConfigAction, config: HookgateConfig) -> Result<()> {
    match action {
        ConfigAction::Show {
            format,
            show_secrets,
        } => {
            let config = if show_secrets {
                config
            } else {
                redacted(config)
            };
            println!("{}", render(&normalized(config), format)?);
            Ok(())
        },
    }
}

fn render(config: &HookgateConfig, format: Format) -> Result<String> {
    Ok(match format {
        Format::Toml => toml::to_string_pretty(config)?,
        Format::Json => serde_json::to_string_pretty(config)?,
    })
}

fn mask(secret: &mut Option<Secret<String>>) {
    if secret.is_some() {
        *secret = Some(Secret::new(MASK.into()));
    }
}

fn redacted(mut config: HookgateConfig) -> HookgateConfig {
    mask(&mut config.auth.default_api_key);
    for seed in &mut config.plugins {
        mask(&mut seed.verify_token);
        mask(&mut seed.app_secret);
        mask(&mut seed.bot_token);
    }
    config
}

/// TOML has no null; absent plugin settings print as an empty table.
fn normalized(mut config: HookgateConfig) -> HookgateConfig {
    for seed in &mut config.plugins {
        if seed.settings.is_null() {
            seed.settings = Value::Object(Default::default());
        }
    }
    config
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, hookgate_config::PluginSeed};

    fn config_with_secrets() -> HookgateConfig {
        let mut config = HookgateConfig::default();
        config.auth.default_api_key = Some(Secret::new("system-secret".into()));
        config.plugins = vec![PluginSeed {
            id: "wa".into(),
            platform: "whatsapp".into(),
            app_secret: Some(Secret::new("meta-secret".into())),
            ..Default::default()
        }];
        config
    }

    #[test]
    fn secrets_are_masked_by_default() {
        let shown = render(
            &normalized(redacted(config_with_secrets())),
            Format::Json,
        )
        .unwrap();
        assert!(!shown.contains("system-secret"));
        assert!(!shown.contains("meta-secret"));
        assert!(shown.contains(MASK));
    }

    #[test]
    fn toml_output_round_trips() {
        let shown = render(&normalized(redacted(config_with_secrets())), Format::Toml).unwrap();
        let parsed: HookgateConfig = toml::from_str(&shown).unwrap();
        assert_eq!(parsed.server.port, 3002);
        assert_eq!(parsed.plugins.len(), 1);
        assert_eq!(parsed.plugins[0].id, "wa");
    }
}
