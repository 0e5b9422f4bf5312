use {anyhow::Result, async_trait::async_trait, sqlx::SqlitePool};

use hookgate_auth::{ApiKeyRecord, ApiKeyStore};

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: String,
    user_id: String,
    key_hash: String,
    masked_key: String,
    name: String,
    created_at: i64,
    last_used_at: Option<i64>,
    expires_at: Option<i64>,
}

impl From<ApiKeyRow> for ApiKeyRecord {
    fn from(r: ApiKeyRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            key_hash: r.key_hash,
            masked_key: r.masked_key,
            name: r.name,
            created_at: r.created_at,
            last_used_at: r.last_used_at,
            expires_at: r.expires_at,
        }
    }
}

/// SQLite-backed API key store. Only key digests are persisted.
pub struct SqliteApiKeyStore {
    pool: SqlitePool,
}

impl SqliteApiKeyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table without the migration runner (in-memory test pools).
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS api_keys (
                id           TEXT    PRIMARY KEY,
                user_id      TEXT    NOT NULL,
                key_hash     TEXT    NOT NULL UNIQUE,
                masked_key   TEXT    NOT NULL,
                name         TEXT    NOT NULL,
                created_at   INTEGER NOT NULL,
                last_used_at INTEGER,
                expires_at   INTEGER
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ApiKeyStore for SqliteApiKeyStore {
    async fn create(&self, record: ApiKeyRecord) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO api_keys
                 (id, user_id, key_hash, masked_key, name, created_at, last_used_at, expires_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.key_hash)
        .bind(&record.masked_key)
        .bind(&record.name)
        .bind(record.created_at)
        .bind(record.last_used_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_key(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys WHERE key_hash = ?")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn get(&self, id: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ApiKeyRecord>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT * FROM api_keys WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn touch(&self, id: &str, now_ms: i64) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(now_ms)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, hookgate_auth::hash_api_key};

    async fn test_store() -> SqliteApiKeyStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteApiKeyStore::init(&pool).await.unwrap();
        SqliteApiKeyStore::new(pool)
    }

    #[tokio::test]
    async fn create_and_find_by_key() {
        let store = test_store().await;
        let (record, raw) = ApiKeyRecord::mint("u1", Some("ci".into()), None, 1_000);
        store.create(record.clone()).await.unwrap();

        let found = store.find_by_key(&hash_api_key(&raw)).await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
        assert_eq!(found.name, "ci");
        assert!(found.last_used_at.is_none());
        assert!(store.find_by_key("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_digest_is_rejected() {
        let store = test_store().await;
        let (record, _) = ApiKeyRecord::mint("u1", None, None, 1_000);
        store.create(record.clone()).await.unwrap();

        let mut dup = record;
        dup.id = "other".into();
        assert!(store.create(dup).await.is_err());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_scoped() {
        let store = test_store().await;
        let (old, _) = ApiKeyRecord::mint("u1", Some("old".into()), None, 1_000);
        let (new, _) = ApiKeyRecord::mint("u1", Some("new".into()), None, 2_000);
        let (other, _) = ApiKeyRecord::mint("u2", None, None, 3_000);
        for r in [old, new, other] {
            store.create(r).await.unwrap();
        }

        let names: Vec<_> = store
            .list_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["new", "old"]);
    }

    #[tokio::test]
    async fn touch_and_delete() {
        let store = test_store().await;
        let (record, _) = ApiKeyRecord::mint("u1", None, Some(9_000), 1_000);
        store.create(record.clone()).await.unwrap();

        store.touch(&record.id, 5_000).await.unwrap();
        let got = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(got.last_used_at, Some(5_000));
        assert_eq!(got.expires_at, Some(9_000));

        assert!(store.delete(&record.id).await.unwrap());
        assert!(!store.delete(&record.id).await.unwrap());
        assert!(store.get(&record.id).await.unwrap().is_none());
    }
}
