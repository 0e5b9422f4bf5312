use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Json, Router,
        extract::State,
        http::StatusCode,
        middleware::from_fn_with_state,
        response::{IntoResponse, Response},
        routing::{delete, get, post},
    },
    hookgate_common::time::{now_ms, to_rfc3339},
    hookgate_config::HookgateConfig,
    serde_json::json,
    tower_http::{
        catch_panic::CatchPanicLayer,
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{error, info},
};

#[cfg(feature = "metrics")]
use hookgate_metrics::{MetricsRecorderConfig, init_metrics};

#[cfg(feature = "prometheus")]
use axum::http::header;

#[cfg(feature = "metrics")]
use crate::metrics_middleware::http_metrics_middleware;

use crate::{
    api_key_middleware::require_api_key,
    api_key_routes::{create_key, delete_key, list_keys, verify_key},
    embed_routes::{embed_code, list_interactions, log_chat},
    open_stores,
    plugin_routes::{delete_plugin, list_plugins, upsert_plugin},
    rate_limit::http_rate_limit,
    state::GatewayState,
    track_routes::{list_events, track_event, usage_summary},
    usage_routes::{get_usage, track_usage},
    webhooks::webhook_router,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router. Exposed for integration tests, which serve it
/// on an ephemeral port.
pub fn build_gateway_app(gateway: Arc<GatewayState>) -> Router {
    let app_state = AppState { gateway };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/api/keys", get(list_keys).post(create_key))
        .route("/api/keys/{id}", delete(delete_key))
        .route("/api/plugins", get(list_plugins).put(upsert_plugin))
        .route("/api/plugins/{id}", delete(delete_plugin))
        .route("/api/usage", get(get_usage))
        .route("/api/usage/track", post(track_usage))
        .route("/api/embed/chat", post(log_chat))
        .route("/api/embed/interactions", get(list_interactions))
        .route("/api/embed/code", get(embed_code))
        .route("/api/track", post(track_event))
        .route("/api/track/events", get(list_events))
        .route("/api/track/usage/summary", get(usage_summary))
        .route_layer(from_fn_with_state(app_state.clone(), require_api_key));

    #[allow(unused_mut)]
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/keys/verify", post(verify_key))
        .merge(protected)
        .merge(webhook_router(&app_state));

    #[cfg(feature = "prometheus")]
    if app_state.gateway.config.metrics.prometheus_endpoint {
        router = router.route("/metrics", get(prometheus_metrics_handler));
    }

    #[cfg(feature = "metrics")]
    {
        router = router.layer(axum::middleware::from_fn(http_metrics_middleware));
    }

    router
        .layer(from_fn_with_state(app_state.clone(), http_rate_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Open storage, load plugins and serve until interrupted.
pub async fn start_gateway(config: HookgateConfig) -> anyhow::Result<()> {
    let stores = open_stores(&config.database).await?;

    #[cfg(feature = "metrics")]
    let metrics_handle = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: config
            .metrics
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })?;

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let sweep_every = Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1));

    let state = GatewayState::new(config, stores);
    #[cfg(feature = "metrics")]
    let state = state.with_metrics_handle(metrics_handle);
    let state = Arc::new(state);

    state.load_plugins().await?;
    state.http_limiter.start_sweeper(sweep_every);
    state.webhook_limiter.start_sweeper(sweep_every);

    let app = build_gateway_app(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        version = %state.version,
        rate_limit = state.config.rate_limit.enabled,
        require_signatures = state.config.webhooks.require_signatures,
        "hookgate listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("hookgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": state.gateway.version,
        "timestamp": to_rfc3339(now_ms()),
    }))
}

/// Prometheus text exposition. Unauthenticated so scrapers can reach it.
#[cfg(feature = "prometheus")]
async fn prometheus_metrics_handler(State(state): State<AppState>) -> Response {
    match state.gateway.metrics_handle.as_ref() {
        Some(handle) => (
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not enabled").into_response(),
    }
}

fn panic_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}
