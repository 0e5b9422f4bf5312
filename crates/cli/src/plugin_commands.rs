use {
    anyhow::Result,
    clap::Subcommand,
    hookgate_channels::{PluginConfig, PluginConfigStore, PluginStatus},
    hookgate_common::time::now_ms,
};

#[derive(Subcommand)]
pub enum PluginAction {
    /// List plugin configurations. Without `--user`, lists every connected one.
    List {
        #[arg(long)]
        user: Option<String>,
    },
    /// Stop routing webhooks to a plugin. Takes effect on the next start.
    Disconnect { id: String },
}

pub async fn handle_plugins(action: PluginAction, store: &dyn PluginConfigStore) -> Result<()> {
    match action {
        PluginAction::List { user } => {
            let plugins = match &user {
                Some(user) => store.list_for_user(user).await?,
                None => store.list_connected().await?,
            };
            if plugins.is_empty() {
                println!("No plugins found.");
            }
            for plugin in &plugins {
                println!("{}", plugin_line(plugin));
            }
            Ok(())
        },
        PluginAction::Disconnect { id } => {
            if !store
                .set_status(&id, PluginStatus::Disconnected, now_ms())
                .await?
            {
                anyhow::bail!("no plugin with id {id}");
            }
            println!("Plugin {id} disconnected.");
            Ok(())
        },
    }
}

fn plugin_line(plugin: &PluginConfig) -> String {
    format!(
        "  {}  {}  {}  owner: {}  {}",
        plugin.id,
        plugin.platform,
        plugin.status.as_str(),
        plugin.user_id,
        plugin.name,
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        hookgate_channels::{Credentials, InMemoryPluginConfigStore, Platform},
        serde_json::json,
    };

    fn config(id: &str) -> PluginConfig {
        PluginConfig {
            id: id.into(),
            user_id: "u1".into(),
            platform: Platform::Telegram,
            name: "Support bot".into(),
            credentials: Credentials::default(),
            status: PluginStatus::Connected,
            settings: json!({}),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn line_shows_platform_and_status() {
        let line = plugin_line(&config("tg-1"));
        assert!(line.contains("tg-1"));
        assert!(line.contains("telegram"));
        assert!(line.contains("connected"));
    }

    #[tokio::test]
    async fn disconnect_updates_the_store() {
        let store = InMemoryPluginConfigStore::new();
        store.upsert(config("tg-1")).await.unwrap();

        handle_plugins(PluginAction::Disconnect { id: "tg-1".into() }, &store)
            .await
            .unwrap();
        assert!(store.list_connected().await.unwrap().is_empty());

        let missing = handle_plugins(PluginAction::Disconnect { id: "nope".into() }, &store).await;
        assert!(missing.is_err());
    }
}
