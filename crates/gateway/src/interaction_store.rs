//! Chat exchanges logged by embedded website widgets.

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::Serialize,
    sqlx::{QueryBuilder, Sqlite, SqlitePool},
    tokio::sync::RwLock,
};

/// A logged widget exchange. `timestamp` is RFC 3339 (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Interaction {
    pub id: i64,
    pub agent_id: String,
    pub user_id: String,
    pub visitor_id: String,
    pub plugin_id: String,
    pub message: String,
    pub response: String,
    pub tokens: i64,
    pub timestamp: String,
}

/// An exchange to log; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewInteraction {
    pub agent_id: String,
    pub user_id: String,
    pub visitor_id: String,
    pub plugin_id: String,
    pub message: String,
    pub response: String,
    pub tokens: i64,
    pub timestamp: String,
}

/// Filters for [`InteractionStore::query`]. Timestamp bounds are inclusive.
#[derive(Debug, Clone)]
pub struct InteractionQuery {
    pub user_id: String,
    pub agent_id: Option<String>,
    pub visitor_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: u32,
}

impl InteractionQuery {
    fn matches(&self, i: &Interaction) -> bool {
        i.user_id == self.user_id
            && self.agent_id.as_ref().is_none_or(|a| *a == i.agent_id)
            && self.visitor_id.as_ref().is_none_or(|v| *v == i.visitor_id)
            && self.start.as_ref().is_none_or(|s| i.timestamp >= *s)
            && self.end.as_ref().is_none_or(|e| i.timestamp <= *e)
    }
}

#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn record(&self, interaction: NewInteraction) -> Result<i64>;
    /// Matching rows, newest first, at most `query.limit`.
    async fn query(&self, query: &InteractionQuery) -> Result<Vec<Interaction>>;
}

#[derive(Default)]
pub struct InMemoryInteractionStore {
    rows: RwLock<Vec<Interaction>>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn record(&self, new: NewInteraction) -> Result<i64> {
        let mut rows = self.rows.write().await;
        let id = rows.last().map_or(1, |r| r.id + 1);
        rows.push(Interaction {
            id,
            agent_id: new.agent_id,
            user_id: new.user_id,
            visitor_id: new.visitor_id,
            plugin_id: new.plugin_id,
            message: new.message,
            response: new.response,
            tokens: new.tokens,
            timestamp: new.timestamp,
        });
        Ok(id)
    }

    async fn query(&self, query: &InteractionQuery) -> Result<Vec<Interaction>> {
        let mut rows: Vec<_> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|i| query.matches(i))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        rows.truncate(query.limit as usize);
        Ok(rows)
    }
}

pub struct SqliteInteractionStore {
    pool: SqlitePool,
}

impl SqliteInteractionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table without the migration runner (in-memory test pools).
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS plugin_interactions (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id   TEXT    NOT NULL,
                user_id    TEXT    NOT NULL,
                visitor_id TEXT    NOT NULL,
                plugin_id  TEXT    NOT NULL,
                message    TEXT    NOT NULL,
                response   TEXT    NOT NULL,
                tokens     INTEGER NOT NULL DEFAULT 0,
                timestamp  TEXT    NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InteractionStore for SqliteInteractionStore {
    async fn record(&self, new: NewInteraction) -> Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO plugin_interactions
                 (agent_id, user_id, visitor_id, plugin_id, message, response, tokens, timestamp)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&new.agent_id)
        .bind(&new.user_id)
        .bind(&new.visitor_id)
        .bind(&new.plugin_id)
        .bind(&new.message)
        .bind(&new.response)
        .bind(new.tokens)
        .bind(&new.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn query(&self, query: &InteractionQuery) -> Result<Vec<Interaction>> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, agent_id, user_id, visitor_id, plugin_id, message, response, tokens, \
             timestamp FROM plugin_interactions WHERE user_id = ",
        );
        qb.push_bind(&query.user_id);
        if let Some(agent_id) = &query.agent_id {
            qb.push(" AND agent_id = ").push_bind(agent_id);
        }
        if let Some(visitor_id) = &query.visitor_id {
            qb.push(" AND visitor_id = ").push_bind(visitor_id);
        }
        if let Some(start) = &query.start {
            qb.push(" AND timestamp >= ").push_bind(start);
        }
        if let Some(end) = &query.end {
            qb.push(" AND timestamp <= ").push_bind(end);
        }
        qb.push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.limit));

        Ok(qb
            .build_query_as::<Interaction>()
            .fetch_all(&self.pool)
            .await?)
    }
}
