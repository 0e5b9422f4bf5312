//! Inbound webhook endpoints.
//!
//! `GET /webhooks/{platform}` answers subscription handshakes. `POST` runs
//! signature verification against every registered plugin for the platform,
//! then offers the payload to the plugins that accepted the request, in
//! registration order, until one claims it.
//!
//! Routes also match `/webhooks/{platform}/{*rest}` so Telegram can carry the
//! bot token in the path.

use std::{collections::HashMap, sync::Arc, time::Instant};

use {
    axum::{
        Json, Router,
        extract::{OriginalUri, Path, Query, State},
        http::{HeaderMap, StatusCode},
        middleware::from_fn_with_state,
        response::{IntoResponse, Response},
        routing::get,
    },
    bytes::Bytes,
    hookgate_channels::{
        Handshake, Platform, RequestAuth, Verification, WebhookPlugin, dispatch,
        verify::verify_hub_token, verify_request,
    },
    hookgate_discord::is_ping,
    serde_json::{Value, json},
    tower_http::limit::RequestBodyLimitLayer,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use hookgate_metrics::{counter, histogram, labels, webhooks as wh_metrics};

use crate::{error::ApiError, rate_limit::webhook_rate_limit, server::AppState};

/// Webhook routes with their body limit and per-IP limiter.
pub fn webhook_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/webhooks/{platform}", get(webhook_get).post(webhook_post))
        .route(
            "/webhooks/{platform}/{*rest}",
            get(webhook_get).post(webhook_post),
        )
        .layer(RequestBodyLimitLayer::new(
            state.gateway.config.webhooks.max_body_bytes,
        ))
        .layer(from_fn_with_state(state.clone(), webhook_rate_limit))
}

fn parse_platform(params: &HashMap<String, String>) -> Result<Platform, Response> {
    params
        .get("platform")
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| ApiError::bad_request("invalid platform").into_response())
}

pub async fn webhook_get(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let platform = match parse_platform(&params) {
        Ok(platform) => platform,
        Err(response) => return response,
    };
    record_received(&platform, "GET");

    match platform.handshake() {
        Handshake::MetaHub => meta_handshake(&state, &platform, &query).await,
        Handshake::WordPressPing => Json(json!({ "status": "ok" })).into_response(),
        Handshake::Generic => Json(json!({
            "success": true,
            "message": format!("Webhook endpoint for {platform} is active"),
            "platform": platform,
        }))
        .into_response(),
    }
}

/// Graph API subscription check: echo `hub.challenge` when `hub.verify_token`
/// matches a registered plugin's verify token.
async fn meta_handshake(
    state: &AppState,
    platform: &Platform,
    query: &HashMap<String, String>,
) -> Response {
    let mode = query.get("hub.mode").map(String::as_str);
    let token = query.get("hub.verify_token");
    let challenge = query.get("hub.challenge");

    let verified = match (mode, token, challenge) {
        (Some("subscribe"), Some(token), Some(_)) => state
            .gateway
            .registry
            .plugins_by_platform(platform)
            .await
            .iter()
            .any(|p| {
                p.config()
                    .credentials
                    .verify_token()
                    .is_some_and(|expected| verify_hub_token(token, expected))
            }),
        _ => false,
    };
    record_handshake(platform, verified);

    match challenge {
        Some(challenge) if verified => {
            info!(%platform, "webhook subscription verified");
            (StatusCode::OK, challenge.clone()).into_response()
        },
        _ => {
            warn!(%platform, mode = ?mode, "webhook verification failed");
            (StatusCode::FORBIDDEN, "Verification failed").into_response()
        },
    }
}

/// Plugins whose credentials accept this request.
fn accepted_plugins(
    plugins: &[Arc<dyn WebhookPlugin>],
    platform: &Platform,
    request: &RequestAuth<'_>,
    require_signatures: bool,
) -> Vec<Arc<dyn WebhookPlugin>> {
    let scheme = platform.verification_scheme();
    plugins
        .iter()
        .filter(
            |p| match verify_request(scheme, &p.config().credentials, request) {
                Verification::Verified => true,
                Verification::Unsigned => !require_signatures,
                Verification::Rejected => {
                    debug!(plugin_id = p.id(), "signature rejected");
                    false
                },
            },
        )
        .cloned()
        .collect()
}

pub async fn webhook_post(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let platform = match parse_platform(&params) {
        Ok(platform) => platform,
        Err(response) => return response,
    };
    record_received(&platform, "POST");
    let gateway = &state.gateway;

    let plugins = gateway.registry.plugins_by_platform(&platform).await;
    if plugins.is_empty() {
        debug!(%platform, "webhook for platform without plugins");
        return if gateway.config.webhooks.acknowledge_unconfigured {
            Json(json!({
                "success": false,
                "message": "No plugins configured for platform",
                "platform": platform,
            }))
            .into_response()
        } else {
            ApiError::not_found(format!("No plugins found for platform: {platform}"))
                .into_response()
        };
    }

    let request = RequestAuth {
        headers: &headers,
        path: uri.path(),
        body: &body,
    };
    let accepted = accepted_plugins(
        &plugins,
        &platform,
        &request,
        gateway.config.webhooks.require_signatures,
    );
    if accepted.is_empty() {
        warn!(%platform, candidates = plugins.len(), "webhook signature rejected");
        record_signature_failure(&platform);
        return ApiError::Unauthorized("invalid signature".into()).into_response();
    }

    let mut payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(%platform, error = %e, "webhook body is not JSON");
            return ApiError::bad_request("Invalid JSON payload").into_response();
        },
    };

    if platform == Platform::Discord && is_ping(&payload) {
        debug!("answering discord ping");
        return Json(json!({ "type": 1 })).into_response();
    }

    let Some(object) = payload.as_object_mut() else {
        return ApiError::bad_request("Webhook payload must be a JSON object").into_response();
    };
    object.insert("platform".into(), Value::String(platform.to_string()));

    let started = Instant::now();
    let outcome = dispatch(&accepted, &payload).await;
    record_dispatch(&platform, started, outcome.claim.is_some());

    match outcome.claim {
        Some(claim) => {
            info!(
                %platform,
                plugin_id = %claim.plugin_id,
                failures = outcome.failures,
                "webhook processed"
            );
            if let Err(e) = gateway.sink.deliver(claim.message).await {
                error!(%platform, plugin_id = %claim.plugin_id, error = %e, "message sink failed");
            }
            Json(json!({
                "success": true,
                "message": "Webhook processed successfully",
                "platform": platform,
                "messageReceived": true,
            }))
            .into_response()
        },
        None => {
            info!(
                %platform,
                candidates = accepted.len(),
                failures = outcome.failures,
                "webhook not claimed"
            );
            Json(json!({
                "success": false,
                "message": "Webhook received but not processed by any plugin",
                "platform": platform,
            }))
            .into_response()
        },
    }
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_received(platform: &Platform, method: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(
        wh_metrics::RECEIVED_TOTAL,
        labels::PLATFORM => platform.to_string(),
        labels::METHOD => method
    )
    .increment(1);
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_handshake(platform: &Platform, success: bool) {
    #[cfg(feature = "metrics")]
    counter!(
        wh_metrics::HANDSHAKES_TOTAL,
        labels::PLATFORM => platform.to_string(),
        labels::SUCCESS => success.to_string()
    )
    .increment(1);
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_signature_failure(platform: &Platform) {
    #[cfg(feature = "metrics")]
    counter!(wh_metrics::SIGNATURE_FAILURES_TOTAL, labels::PLATFORM => platform.to_string())
        .increment(1);
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn record_dispatch(platform: &Platform, started: Instant, claimed: bool) {
    #[cfg(feature = "metrics")]
    {
        let platform = platform.to_string();
        histogram!(wh_metrics::DISPATCH_DURATION_SECONDS, labels::PLATFORM => platform.clone())
            .record(started.elapsed().as_secs_f64());
        let name = if claimed {
            wh_metrics::CLAIMED_TOTAL
        } else {
            wh_metrics::UNCLAIMED_TOTAL
        };
        counter!(name, labels::PLATFORM => platform).increment(1);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        axum::http::HeaderValue,
        hookgate_channels::{
            Credentials, InboundMessage, PluginConfig, PluginStatus, verify::meta_signature,
        },
        secrecy::Secret,
    };

    struct Silent(PluginConfig);

    #[async_trait]
    impl WebhookPlugin for Silent {
        fn config(&self) -> &PluginConfig {
            &self.0
        }

        async fn handle_webhook(
            &self,
            _payload: &Value,
        ) -> hookgate_channels::Result<Option<InboundMessage>> {
            Ok(None)
        }
    }

    fn plugin(id: &str, app_secret: Option<&str>) -> Arc<dyn WebhookPlugin> {
        Arc::new(Silent(PluginConfig {
            id: id.into(),
            user_id: "u1".into(),
            platform: Platform::WhatsApp,
            name: id.into(),
            credentials: Credentials {
                app_secret: app_secret.map(|s| Secret::new(s.to_string())),
                ..Default::default()
            },
            status: PluginStatus::Connected,
            settings: json!({}),
            created_at: 0,
            updated_at: 0,
        }))
    }

    fn ids(plugins: &[Arc<dyn WebhookPlugin>]) -> Vec<&str> {
        plugins.iter().map(|p| p.id()).collect()
    }

    #[test]
    fn only_matching_secrets_and_unsigned_are_accepted() {
        let body = br#"{"object":"whatsapp_business_account"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-hub-signature-256",
            HeaderValue::from_str(&meta_signature(body, "right").unwrap()).unwrap(),
        );
        let request = RequestAuth {
            headers: &headers,
            path: "/webhooks/whatsapp",
            body,
        };
        let plugins = [
            plugin("wrong", Some("wrong")),
            plugin("right", Some("right")),
            plugin("open", None),
        ];

        let lax = accepted_plugins(&plugins, &Platform::WhatsApp, &request, false);
        assert_eq!(ids(&lax), ["right", "open"]);

        let strict = accepted_plugins(&plugins, &Platform::WhatsApp, &request, true);
        assert_eq!(ids(&strict), ["right"]);
    }

    #[test]
    fn platform_param_is_validated() {
        let mut params = HashMap::new();
        params.insert("platform".to_string(), "WhatsApp".to_string());
        assert_eq!(parse_platform(&params).unwrap(), Platform::WhatsApp);

        params.insert("platform".to_string(), "not a platform!".to_string());
        let response = parse_platform(&params).unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
