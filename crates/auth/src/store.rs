use {anyhow::Result, async_trait::async_trait, tokio::sync::RwLock};

use crate::api_key::ApiKeyRecord;

/// Persistent storage for API keys.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn create(&self, record: ApiKeyRecord) -> Result<()>;
    /// Look up a key by the SHA-256 hex of its raw value.
    async fn find_by_key(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>>;
    async fn get(&self, id: &str) -> Result<Option<ApiKeyRecord>>;
    /// Newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ApiKeyRecord>>;
    /// Record a successful authentication.
    async fn touch(&self, id: &str, now_ms: i64) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Process-local key store.
#[derive(Default)]
pub struct InMemoryApiKeyStore {
    keys: RwLock<Vec<ApiKeyRecord>>,
}

impl InMemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyStore for InMemoryApiKeyStore {
    async fn create(&self, record: ApiKeyRecord) -> Result<()> {
        let mut keys = self.keys.write().await;
        if keys.iter().any(|k| k.key_hash == record.key_hash) {
            anyhow::bail!("api key already exists");
        }
        keys.push(record);
        Ok(())
    }

    async fn find_by_key(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        Ok(self
            .keys
            .read()
            .await
            .iter()
            .find(|k| k.key_hash == key_hash)
            .cloned())
    }

    async fn get(&self, id: &str) -> Result<Option<ApiKeyRecord>> {
        Ok(self.keys.read().await.iter().find(|k| k.id == id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ApiKeyRecord>> {
        let mut keys: Vec<_> = self
            .keys
            .read()
            .await
            .iter()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn touch(&self, id: &str, now_ms: i64) -> Result<()> {
        if let Some(key) = self.keys.write().await.iter_mut().find(|k| k.id == id) {
            key.last_used_at = Some(now_ms);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut keys = self.keys.write().await;
        let before = keys.len();
        keys.retain(|k| k.id != id);
        Ok(keys.len() != before)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::api_key::hash_api_key};

    #[tokio::test]
    async fn lifecycle() {
        let store = InMemoryApiKeyStore::new();
        let (old, _) = ApiKeyRecord::mint("u1", Some("old".into()), None, 1);
        let (new, raw) = ApiKeyRecord::mint("u1", Some("new".into()), None, 2);
        let (other, _) = ApiKeyRecord::mint("u2", None, None, 3);
        for r in [old.clone(), new.clone(), other] {
            store.create(r).await.unwrap();
        }

        let listed = store.list_for_user("u1").await.unwrap();
        assert_eq!(
            listed.iter().map(|k| k.name.as_str()).collect::<Vec<_>>(),
            ["new", "old"]
        );

        let found = store.find_by_key(&hash_api_key(&raw)).await.unwrap();
        assert_eq!(found.unwrap().id, new.id);
        assert!(store.find_by_key("nope").await.unwrap().is_none());

        store.touch(&new.id, 42).await.unwrap();
        assert_eq!(
            store.get(&new.id).await.unwrap().unwrap().last_used_at,
            Some(42)
        );

        assert!(store.delete(&old.id).await.unwrap());
        assert!(!store.delete(&old.id).await.unwrap());
        assert_eq!(store.list_for_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_hash_is_rejected() {
        let store = InMemoryApiKeyStore::new();
        let (record, _) = ApiKeyRecord::mint("u1", None, None, 1);
        store.create(record.clone()).await.unwrap();
        assert!(store.create(record).await.is_err());
    }
}
