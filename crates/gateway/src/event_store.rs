//! Analytics events reported by embedded widgets.

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::Serialize,
    serde_json::Value,
    sqlx::{QueryBuilder, Sqlite, SqlitePool},
    tokio::sync::RwLock,
};

/// A stored event. `data` holds whatever extra fields the widget sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedEvent {
    pub id: i64,
    pub event_type: String,
    pub agent_id: String,
    pub user_id: String,
    pub visitor_id: String,
    pub url: Option<String>,
    pub referrer: Option<String>,
    /// RFC 3339 (UTC).
    pub timestamp: String,
    pub data: Value,
}

/// An event to store; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: String,
    pub agent_id: String,
    pub user_id: String,
    pub visitor_id: String,
    pub url: Option<String>,
    pub referrer: Option<String>,
    pub timestamp: String,
    pub data: Value,
}

/// Filters for [`EventStore::query`]. Timestamp bounds are inclusive.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub user_id: String,
    pub agent_id: Option<String>,
    pub event_type: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: u32,
}

impl EventQuery {
    fn matches(&self, e: &TrackedEvent) -> bool {
        e.user_id == self.user_id
            && self.agent_id.as_ref().is_none_or(|a| *a == e.agent_id)
            && self.event_type.as_ref().is_none_or(|t| *t == e.event_type)
            && self.start.as_ref().is_none_or(|s| e.timestamp >= *s)
            && self.end.as_ref().is_none_or(|end| e.timestamp <= *end)
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn record(&self, event: NewEvent) -> Result<i64>;
    /// Matching events, newest first, at most `query.limit`.
    async fn query(&self, query: &EventQuery) -> Result<Vec<TrackedEvent>>;
}

#[derive(Default)]
pub struct InMemoryEventStore {
    rows: RwLock<Vec<TrackedEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn record(&self, new: NewEvent) -> Result<i64> {
        let mut rows = self.rows.write().await;
        let id = rows.last().map_or(1, |r| r.id + 1);
        rows.push(TrackedEvent {
            id,
            event_type: new.event_type,
            agent_id: new.agent_id,
            user_id: new.user_id,
            visitor_id: new.visitor_id,
            url: new.url,
            referrer: new.referrer,
            timestamp: new.timestamp,
            data: new.data,
        });
        Ok(id)
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<TrackedEvent>> {
        let mut rows: Vec<_> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        rows.truncate(query.limit as usize);
        Ok(rows)
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    event_type: String,
    agent_id: String,
    user_id: String,
    visitor_id: String,
    url: Option<String>,
    referrer: Option<String>,
    timestamp: String,
    data: String,
}

impl From<EventRow> for TrackedEvent {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            event_type: row.event_type,
            agent_id: row.agent_id,
            user_id: row.user_id,
            visitor_id: row.visitor_id,
            url: row.url,
            referrer: row.referrer,
            timestamp: row.timestamp,
            data: serde_json::from_str(&row.data)
                .unwrap_or_else(|_| Value::Object(Default::default())),
        }
    }
}

pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table without the migration runner (in-memory test pools).
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS events (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                agent_id   TEXT NOT NULL,
                user_id    TEXT NOT NULL,
                visitor_id TEXT NOT NULL,
                url        TEXT,
                referrer   TEXT,
                timestamp  TEXT NOT NULL,
                data       TEXT NOT NULL DEFAULT '{}'
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn record(&self, new: NewEvent) -> Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO events
                 (event_type, agent_id, user_id, visitor_id, url, referrer, timestamp, data)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&new.event_type)
        .bind(&new.agent_id)
        .bind(&new.user_id)
        .bind(&new.visitor_id)
        .bind(&new.url)
        .bind(&new.referrer)
        .bind(&new.timestamp)
        .bind(new.data.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn query(&self, query: &EventQuery) -> Result<Vec<TrackedEvent>> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT id, event_type, agent_id, user_id, visitor_id, url, referrer, timestamp, data \
             FROM events WHERE user_id = ",
        );
        qb.push_bind(&query.user_id);
        if let Some(agent_id) = &query.agent_id {
            qb.push(" AND agent_id = ").push_bind(agent_id);
        }
        if let Some(event_type) = &query.event_type {
            qb.push(" AND event_type = ").push_bind(event_type);
        }
        if let Some(start) = &query.start {
            qb.push(" AND timestamp >= ").push_bind(start);
        }
        if let Some(end) = &query.end {
            qb.push(" AND timestamp <= ").push_bind(end);
        }
        qb.push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.limit));

        let rows = qb.build_query_as::<EventRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(TrackedEvent::from).collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, std::sync::Arc};

    fn event(kind: &str, agent: &str, timestamp: &str) -> NewEvent {
        NewEvent {
            event_type: kind.into(),
            agent_id: agent.into(),
            user_id: "u1".into(),
            visitor_id: "v1".into(),
            url: Some("https://shop.example.com/".into()),
            referrer: None,
            timestamp: timestamp.into(),
            data: json!({ "count": 1 }),
        }
    }

    fn query() -> EventQuery {
        EventQuery {
            user_id: "u1".into(),
            agent_id: None,
            event_type: None,
            start: None,
            end: None,
            limit: 100,
        }
    }

    async fn stores() -> Vec<Arc<dyn EventStore>> {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteEventStore::init(&pool).await.unwrap();
        vec![
            Arc::new(InMemoryEventStore::new()),
            Arc::new(SqliteEventStore::new(pool)),
        ]
    }

    #[tokio::test]
    async fn events_keep_their_data_and_filter() {
        for store in stores().await {
            store
                .record(event("widget_opened", "a1", "2025-03-01T09:00:00Z"))
                .await
                .unwrap();
            store
                .record(event("message_sent", "a1", "2025-03-01T09:01:00Z"))
                .await
                .unwrap();
            store
                .record(event("message_sent", "a2", "2025-03-02T09:00:00Z"))
                .await
                .unwrap();

            let all = store.query(&query()).await.unwrap();
            assert_eq!(all.len(), 3);
            assert_eq!(all[0].agent_id, "a2");
            assert_eq!(all[0].data, json!({ "count": 1 }));
            assert_eq!(all[0].url.as_deref(), Some("https://shop.example.com/"));
            assert!(all[0].referrer.is_none());

            let sent_by_a1 = store
                .query(&EventQuery {
                    agent_id: Some("a1".into()),
                    event_type: Some("message_sent".into()),
                    ..query()
                })
                .await
                .unwrap();
            assert_eq!(sent_by_a1.len(), 1);
            assert_eq!(sent_by_a1[0].timestamp, "2025-03-01T09:01:00Z");

            let before = store
                .query(&EventQuery {
                    end: Some("2025-03-01T23:59:59Z".into()),
                    limit: 1,
                    ..query()
                })
                .await
                .unwrap();
            assert_eq!(before.len(), 1);
            assert_eq!(before[0].event_type, "message_sent");
        }
    }
}
