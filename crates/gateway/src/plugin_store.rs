use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    sqlx::SqlitePool,
};

use hookgate_channels::{Credentials, PluginConfig, PluginConfigStore, PluginStatus};

#[derive(sqlx::FromRow)]
struct PluginConfigRow {
    id: String,
    user_id: String,
    platform: String,
    name: String,
    verify_token: Option<String>,
    app_secret: Option<String>,
    bot_token: Option<String>,
    public_key: Option<String>,
    status: String,
    settings: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<PluginConfigRow> for PluginConfig {
    type Error = anyhow::Error;

    fn try_from(r: PluginConfigRow) -> Result<Self> {
        Ok(Self {
            platform: r
                .platform
                .parse()
                .with_context(|| format!("plugin {} has an invalid platform", r.id))?,
            status: PluginStatus::parse(&r.status)
                .with_context(|| format!("plugin {} has unknown status {}", r.id, r.status))?,
            settings: serde_json::from_str(&r.settings)?,
            credentials: Credentials {
                verify_token: r.verify_token.map(Secret::new),
                app_secret: r.app_secret.map(Secret::new),
                bot_token: r.bot_token.map(Secret::new),
                public_key: r.public_key,
            },
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn expose(secret: &Option<Secret<String>>) -> Option<&str> {
    secret.as_ref().map(|s| s.expose_secret().as_str())
}

/// SQLite-backed plugin configuration store.
pub struct SqlitePluginConfigStore {
    pool: SqlitePool,
}

impl SqlitePluginConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table without the migration runner (in-memory test pools).
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS plugin_configs (
                id           TEXT    PRIMARY KEY,
                user_id      TEXT    NOT NULL,
                platform     TEXT    NOT NULL,
                name         TEXT    NOT NULL,
                verify_token TEXT,
                app_secret   TEXT,
                bot_token    TEXT,
                public_key   TEXT,
                status       TEXT    NOT NULL DEFAULT 'connected',
                settings     TEXT    NOT NULL DEFAULT '{}',
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PluginConfigStore for SqlitePluginConfigStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<PluginConfig>> {
        let rows = sqlx::query_as::<_, PluginConfigRow>(
            "SELECT * FROM plugin_configs WHERE user_id = ? ORDER BY created_at, rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_connected(&self) -> Result<Vec<PluginConfig>> {
        let rows = sqlx::query_as::<_, PluginConfigRow>(
            "SELECT * FROM plugin_configs WHERE status = 'connected' ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<PluginConfig>> {
        let row = sqlx::query_as::<_, PluginConfigRow>("SELECT * FROM plugin_configs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn upsert(&self, config: PluginConfig) -> Result<()> {
        let settings = serde_json::to_string(&config.settings)?;
        sqlx::query(
            r#"INSERT INTO plugin_configs
                 (id, user_id, platform, name, verify_token, app_secret, bot_token,
                  public_key, status, settings, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 user_id = excluded.user_id,
                 platform = excluded.platform,
                 name = excluded.name,
                 verify_token = excluded.verify_token,
                 app_secret = excluded.app_secret,
                 bot_token = excluded.bot_token,
                 public_key = excluded.public_key,
                 status = excluded.status,
                 settings = excluded.settings,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&config.id)
        .bind(&config.user_id)
        .bind(config.platform.as_str())
        .bind(&config.name)
        .bind(expose(&config.credentials.verify_token))
        .bind(expose(&config.credentials.app_secret))
        .bind(expose(&config.credentials.bot_token))
        .bind(config.credentials.public_key.as_deref())
        .bind(config.status.as_str())
        .bind(&settings)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, id: &str, status: PluginStatus, now_ms: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE plugin_configs SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now_ms)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM plugin_configs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, hookgate_channels::Platform, serde_json::json};

    async fn test_store() -> SqlitePluginConfigStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqlitePluginConfigStore::init(&pool).await.unwrap();
        SqlitePluginConfigStore::new(pool)
    }

    fn config(id: &str, user: &str, at: i64) -> PluginConfig {
        PluginConfig {
            id: id.into(),
            user_id: user.into(),
            platform: Platform::WhatsApp,
            name: "Support line".into(),
            credentials: Credentials {
                verify_token: Some(Secret::new("hub-token".into())),
                app_secret: Some(Secret::new("app-secret".into())),
                bot_token: None,
                public_key: None,
            },
            status: PluginStatus::Connected,
            settings: json!({ "phoneNumberId": "123" }),
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn upsert_and_get_round_trips_credentials() {
        let store = test_store().await;
        store.upsert(config("wa", "u1", 1_000)).await.unwrap();

        let got = store.get("wa").await.unwrap().unwrap();
        assert_eq!(got.platform, Platform::WhatsApp);
        assert_eq!(got.credentials.verify_token(), Some("hub-token"));
        assert_eq!(got.credentials.app_secret(), Some("app-secret"));
        assert!(got.credentials.bot_token().is_none());
        assert_eq!(got.settings["phoneNumberId"], "123");
    }

    #[tokio::test]
    async fn upsert_preserves_created_at() {
        let store = test_store().await;
        store.upsert(config("wa", "u1", 1_000)).await.unwrap();

        let mut updated = config("wa", "u1", 5_000);
        updated.name = "Renamed".into();
        store.upsert(updated).await.unwrap();

        let got = store.get("wa").await.unwrap().unwrap();
        assert_eq!(got.name, "Renamed");
        assert_eq!(got.created_at, 1_000);
        assert_eq!(got.updated_at, 5_000);
    }

    #[tokio::test]
    async fn list_connected_skips_disconnected() {
        let store = test_store().await;
        store.upsert(config("a", "u1", 1_000)).await.unwrap();
        store.upsert(config("b", "u2", 2_000)).await.unwrap();
        assert!(
            store
                .set_status("a", PluginStatus::Disconnected, 3_000)
                .await
                .unwrap()
        );
        assert!(
            !store
                .set_status("missing", PluginStatus::Disconnected, 3_000)
                .await
                .unwrap()
        );

        let ids: Vec<_> = store
            .list_connected()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["b"]);
        assert_eq!(store.list_for_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = test_store().await;
        store.upsert(config("a", "u1", 1_000)).await.unwrap();
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
    }
}
