//! Gateway: the HTTP surface of hookgate.
//!
//! Lifecycle:
//! 1. Open storage (SQLite or in-memory) and run migrations
//! 2. Persist `[[plugins]]` seeds and register every connected plugin
//! 3. Start the rate-limit sweepers
//! 4. Serve webhooks and the key, plugin, usage, embed and tracking routes
//!
//! Platform behavior lives in the plugin crates; this crate owns routing,
//! authentication, persistence and throttling.

pub mod api_key_middleware;
pub mod api_key_routes;
pub mod api_key_store;
pub mod embed_routes;
pub mod error;
pub mod event_store;
pub mod interaction_store;
#[cfg(feature = "metrics")]
pub mod metrics_middleware;
pub mod plugin_factory;
pub mod plugin_routes;
pub mod plugin_store;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod track_routes;
pub mod usage_routes;
pub mod usage_store;
pub mod webhooks;

use {
    hookgate_config::DatabaseConfig,
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::info,
};

pub use {
    error::{ApiError, ApiResult},
    server::{AppState, build_gateway_app, start_gateway},
    state::{GatewayState, Stores},
};

/// Run database migrations for the gateway tables.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

/// Open the configured stores. Without a database path everything is kept
/// in memory.
pub async fn open_stores(database: &DatabaseConfig) -> anyhow::Result<Stores> {
    let Some(path) = &database.path else {
        info!("no database configured, using in-memory stores");
        return Ok(Stores::in_memory());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let url = format!("sqlite:{}?mode=rwc", path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;
    run_migrations(&pool).await?;
    info!(path = %path.display(), "database ready");
    Ok(Stores::sqlite(pool))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, hookgate_auth::ApiKeyRecord};

    #[tokio::test]
    async fn file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let database = DatabaseConfig {
            path: Some(dir.path().join("nested").join("hookgate.db")),
        };

        let stores = open_stores(&database).await.unwrap();
        let (record, _) = ApiKeyRecord::mint("u1", None, None, 1_000);
        stores.api_keys.create(record.clone()).await.unwrap();
        drop(stores);

        let reopened = open_stores(&database).await.unwrap();
        let keys = reopened.api_keys.list_for_user("u1").await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].id, record.id);
    }

    #[tokio::test]
    async fn no_path_means_memory() {
        let stores = open_stores(&DatabaseConfig { path: None }).await.unwrap();
        assert!(stores.api_keys.list_for_user("u1").await.unwrap().is_empty());
    }
}
