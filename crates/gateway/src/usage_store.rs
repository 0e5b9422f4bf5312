//! Per-day API usage counters for billing.

use std::collections::BTreeMap;

use {
    anyhow::Result,
    async_trait::async_trait,
    serde::Serialize,
    sqlx::{QueryBuilder, Sqlite, SqlitePool},
    tokio::sync::RwLock,
};

/// Bucket value used when a tracked call names no plugin or endpoint.
pub const DEFAULT_BUCKET: &str = "default";

/// One day of usage for a (user, agent, plugin, endpoint) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UsageRecord {
    pub user_id: String,
    pub agent_id: String,
    pub plugin_id: String,
    pub endpoint: String,
    /// `YYYY-MM-DD` (UTC).
    pub date: String,
    pub request_count: i64,
    pub tokens_used: i64,
}

/// Totals per (agent, plugin) over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UsageSummary {
    pub agent_id: String,
    pub plugin_id: String,
    pub total_requests: i64,
    pub total_tokens: i64,
}

/// A single tracked call.
#[derive(Debug, Clone)]
pub struct UsageEvent {
    pub user_id: String,
    pub agent_id: String,
    pub plugin_id: String,
    pub endpoint: String,
    pub date: String,
    pub tokens: i64,
}

/// Filters for [`UsageStore::query`]. Dates are inclusive `YYYY-MM-DD` bounds.
#[derive(Debug, Clone, Default)]
pub struct UsageQuery {
    pub user_id: String,
    pub agent_id: Option<String>,
    pub plugin_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl UsageQuery {
    fn matches(&self, r: &UsageRecord) -> bool {
        r.user_id == self.user_id
            && self.agent_id.as_ref().is_none_or(|a| *a == r.agent_id)
            && self.plugin_id.as_ref().is_none_or(|p| *p == r.plugin_id)
            && self.start_date.as_ref().is_none_or(|d| r.date >= *d)
            && self.end_date.as_ref().is_none_or(|d| r.date <= *d)
    }
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Add one request and `tokens` to the event's daily bucket.
    async fn track(&self, event: UsageEvent) -> Result<()>;
    /// Matching rows, newest date first.
    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>>;
    /// Matching rows summed per (agent, plugin), ordered by agent then plugin.
    async fn summarize(&self, query: &UsageQuery) -> Result<Vec<UsageSummary>>;
}

#[derive(Default)]
pub struct InMemoryUsageStore {
    rows: RwLock<Vec<UsageRecord>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn track(&self, event: UsageEvent) -> Result<()> {
        let mut rows = self.rows.write().await;
        let existing = rows.iter_mut().find(|r| {
            r.user_id == event.user_id
                && r.agent_id == event.agent_id
                && r.plugin_id == event.plugin_id
                && r.endpoint == event.endpoint
                && r.date == event.date
        });
        match existing {
            Some(row) => {
                row.request_count += 1;
                row.tokens_used += event.tokens;
            },
            None => rows.push(UsageRecord {
                user_id: event.user_id,
                agent_id: event.agent_id,
                plugin_id: event.plugin_id,
                endpoint: event.endpoint,
                date: event.date,
                request_count: 1,
                tokens_used: event.tokens,
            }),
        }
        Ok(())
    }

    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>> {
        let mut rows: Vec<_> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn summarize(&self, query: &UsageQuery) -> Result<Vec<UsageSummary>> {
        let mut totals: BTreeMap<(String, String), (i64, i64)> = BTreeMap::new();
        for row in self.rows.read().await.iter().filter(|r| query.matches(r)) {
            let entry = totals
                .entry((row.agent_id.clone(), row.plugin_id.clone()))
                .or_default();
            entry.0 += row.request_count;
            entry.1 += row.tokens_used;
        }
        Ok(totals
            .into_iter()
            .map(
                |((agent_id, plugin_id), (total_requests, total_tokens))| UsageSummary {
                    agent_id,
                    plugin_id,
                    total_requests,
                    total_tokens,
                },
            )
            .collect())
    }
}

pub struct SqliteUsageStore {
    pool: SqlitePool,
}

impl SqliteUsageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table without the migration runner (in-memory test pools).
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS api_usage (
                user_id       TEXT    NOT NULL,
                agent_id      TEXT    NOT NULL,
                plugin_id     TEXT    NOT NULL DEFAULT 'default',
                endpoint      TEXT    NOT NULL DEFAULT 'default',
                date          TEXT    NOT NULL,
                request_count INTEGER NOT NULL DEFAULT 0,
                tokens_used   INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, agent_id, plugin_id, endpoint, date)
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UsageStore for SqliteUsageStore {
    async fn track(&self, event: UsageEvent) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO api_usage
                 (user_id, agent_id, plugin_id, endpoint, date, request_count, tokens_used)
               VALUES (?, ?, ?, ?, ?, 1, ?)
               ON CONFLICT(user_id, agent_id, plugin_id, endpoint, date) DO UPDATE SET
                 request_count = request_count + 1,
                 tokens_used = tokens_used + excluded.tokens_used"#,
        )
        .bind(&event.user_id)
        .bind(&event.agent_id)
        .bind(&event.plugin_id)
        .bind(&event.endpoint)
        .bind(&event.date)
        .bind(event.tokens)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT user_id, agent_id, plugin_id, endpoint, date, request_count, tokens_used \
             FROM api_usage WHERE user_id = ",
        );
        push_filters(&mut qb, query);
        qb.push(" ORDER BY date DESC");

        Ok(qb
            .build_query_as::<UsageRecord>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn summarize(&self, query: &UsageQuery) -> Result<Vec<UsageSummary>> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT agent_id, plugin_id, SUM(request_count) AS total_requests, \
             SUM(tokens_used) AS total_tokens FROM api_usage WHERE user_id = ",
        );
        push_filters(&mut qb, query);
        qb.push(" GROUP BY agent_id, plugin_id ORDER BY agent_id, plugin_id");

        Ok(qb
            .build_query_as::<UsageSummary>()
            .fetch_all(&self.pool)
            .await?)
    }
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, query: &'a UsageQuery) {
    qb.push_bind(&query.user_id);
    if let Some(agent_id) = &query.agent_id {
        qb.push(" AND agent_id = ").push_bind(agent_id);
    }
    if let Some(plugin_id) = &query.plugin_id {
        qb.push(" AND plugin_id = ").push_bind(plugin_id);
    }
    if let Some(start) = &query.start_date {
        qb.push(" AND date >= ").push_bind(start);
    }
    if let Some(end) = &query.end_date {
        qb.push(" AND date <= ").push_bind(end);
    }
}
