use {anyhow::Result, async_trait::async_trait, tokio::sync::RwLock};

use crate::plugin::{PluginConfig, PluginStatus};

/// Persistent storage for plugin configurations.
#[async_trait]
pub trait PluginConfigStore: Send + Sync {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<PluginConfig>>;
    /// Every config with status `connected`, oldest first.
    async fn list_connected(&self) -> Result<Vec<PluginConfig>>;
    async fn get(&self, id: &str) -> Result<Option<PluginConfig>>;
    /// Insert or overwrite by ID. `created_at` of an existing row is preserved.
    async fn upsert(&self, config: PluginConfig) -> Result<()>;
    /// Returns `false` when no config has this ID.
    async fn set_status(&self, id: &str, status: PluginStatus, now_ms: i64) -> Result<bool>;
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Process-local store, used for tests and runs without a database.
#[derive(Default)]
pub struct InMemoryPluginConfigStore {
    rows: RwLock<Vec<PluginConfig>>,
}

impl InMemoryPluginConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginConfigStore for InMemoryPluginConfigStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<PluginConfig>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_connected(&self) -> Result<Vec<PluginConfig>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|c| c.is_connected())
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<PluginConfig>> {
        Ok(self.rows.read().await.iter().find(|c| c.id == id).cloned())
    }

    async fn upsert(&self, mut config: PluginConfig) -> Result<()> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|c| c.id == config.id) {
            Some(existing) => {
                config.created_at = existing.created_at;
                *existing = config;
            },
            None => rows.push(config),
        }
        Ok(())
    }

    async fn set_status(&self, id: &str, status: PluginStatus, now_ms: i64) -> Result<bool> {
        let mut rows = self.rows.write().await;
        Ok(match rows.iter_mut().find(|c| c.id == id) {
            Some(row) => {
                row.status = status;
                row.updated_at = now_ms;
                true
            },
            None => false,
        })
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|c| c.id != id);
        Ok(rows.len() != before)
    }
}
