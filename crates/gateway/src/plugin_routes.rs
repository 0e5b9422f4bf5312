//! `/api/plugins` routes: manage integrations and keep the registry in step
//! with the store.

use {
    axum::{
        Extension, Json,
        extract::{Path, Query, State, rejection::JsonRejection},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    hookgate_auth::Caller,
    hookgate_channels::{Credentials, Platform, PluginConfig, PluginStatus},
    hookgate_common::time::now_ms,
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::info,
};

use crate::{
    api_key_middleware::resolve_user,
    error::{ApiError, ApiResult},
    server::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPluginsQuery {
    pub user_id: Option<String>,
}

/// Body of `PUT /api/plugins`. Omitted credentials keep their stored value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertPluginRequest {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub platform: String,
    pub name: Option<String>,
    #[serde(default)]
    pub credentials: Credentials,
    pub settings: Option<Value>,
    pub status: Option<PluginStatus>,
}

pub async fn list_plugins(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListPluginsQuery>,
) -> ApiResult<Response> {
    let user_id = resolve_user(
        &caller,
        query.user_id.as_deref(),
        "You don't have permission to view these plugins",
    )?;
    let configs = state
        .gateway
        .stores
        .plugins
        .list_for_user(&user_id)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve plugins", e))?;
    let plugins: Vec<_> = configs.iter().map(PluginConfig::view).collect();
    Ok(Json(json!({ "plugins": plugins })).into_response())
}

fn merge_credentials(update: Credentials, existing: Option<&Credentials>) -> Credentials {
    let Some(existing) = existing else {
        return update;
    };
    Credentials {
        verify_token: update.verify_token.or_else(|| existing.verify_token.clone()),
        app_secret: update.app_secret.or_else(|| existing.app_secret.clone()),
        bot_token: update.bot_token.or_else(|| existing.bot_token.clone()),
        public_key: update.public_key.or_else(|| existing.public_key.clone()),
    }
}

pub async fn upsert_plugin(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<UpsertPluginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let gateway = &state.gateway;
    let platform: Platform = body
        .platform
        .parse()
        .map_err(|_| ApiError::bad_request("invalid platform"))?;
    let user_id = resolve_user(
        &caller,
        body.user_id.as_deref(),
        "You don't have permission to manage plugins for this user",
    )?;

    let id = body
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let existing = gateway
        .stores
        .plugins
        .get(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to save plugin", e))?;
    if let Some(existing) = &existing
        && !caller.can_act_for(&existing.user_id)
    {
        return Err(ApiError::forbidden(
            "You don't have permission to modify this plugin",
        ));
    }

    let now = now_ms();
    let config = PluginConfig {
        name: body
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| existing.as_ref().map(|c| c.name.clone()))
            .unwrap_or_else(|| platform.to_string()),
        credentials: merge_credentials(body.credentials, existing.as_ref().map(|c| &c.credentials)),
        status: body.status.unwrap_or(PluginStatus::Connected),
        settings: body
            .settings
            .filter(|s| !s.is_null())
            .or_else(|| existing.as_ref().map(|c| c.settings.clone()))
            .unwrap_or_else(|| json!({})),
        created_at: existing.as_ref().map_or(now, |c| c.created_at),
        updated_at: now,
        id,
        user_id,
        platform,
    };

    // Build before persisting so bad settings never reach the store.
    let plugin = gateway
        .factory
        .build(config.clone())
        .map_err(|e| ApiError::bad_request(format!("Invalid plugin settings: {e}")))?;
    gateway
        .stores
        .plugins
        .upsert(config.clone())
        .await
        .map_err(|e| ApiError::internal("Failed to save plugin", e))?;

    if config.is_connected() {
        gateway.registry.replace(plugin).await;
    } else {
        gateway.registry.unregister(&config.id).await;
    }
    info!(
        plugin_id = %config.id,
        platform = %config.platform,
        status = config.status.as_str(),
        "plugin saved"
    );

    let status = if existing.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(json!({ "plugin": config.view() }))).into_response())
}

/// Disconnect a plugin: it stays stored but stops receiving webhooks.
pub async fn delete_plugin(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let gateway = &state.gateway;
    let config = gateway
        .stores
        .plugins
        .get(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete plugin", e))?
        .ok_or_else(|| ApiError::not_found("Plugin not found"))?;
    if !caller.can_act_for(&config.user_id) {
        return Err(ApiError::forbidden(
            "You don't have permission to delete this plugin",
        ));
    }

    gateway
        .stores
        .plugins
        .set_status(&id, PluginStatus::Disconnected, now_ms())
        .await
        .map_err(|e| ApiError::internal("Failed to delete plugin", e))?;
    gateway.registry.unregister(&id).await;
    info!(plugin_id = %id, "plugin disconnected");

    Ok(Json(json!({ "success": true })).into_response())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    #[test]
    fn omitted_credentials_keep_stored_values() {
        let existing = Credentials {
            verify_token: Some(Secret::new("old-token".into())),
            app_secret: Some(Secret::new("old-secret".into())),
            bot_token: None,
            public_key: Some("abcd".into()),
        };
        let update = Credentials {
            app_secret: Some(Secret::new("new-secret".into())),
            ..Default::default()
        };

        let merged = merge_credentials(update, Some(&existing));
        assert_eq!(merged.verify_token(), Some("old-token"));
        assert_eq!(merged.app_secret(), Some("new-secret"));
        assert_eq!(merged.public_key(), Some("abcd"));
        assert!(merged.bot_token().is_none());
    }

    #[test]
    fn new_plugin_takes_credentials_as_given() {
        let merged = merge_credentials(Credentials::default(), None);
        assert!(merged.app_secret().is_none());
    }

    #[test]
    fn request_parses_camel_case() {
        let body: UpsertPluginRequest = serde_json::from_value(json!({
            "platform": "whatsapp",
            "userId": "u1",
            "credentials": { "verifyToken": "tok", "appSecret": "s" },
            "settings": { "phoneNumberId": "1" },
        }))
        .unwrap();
        assert_eq!(body.user_id.as_deref(), Some("u1"));
        assert_eq!(body.credentials.verify_token(), Some("tok"));
        assert!(body.status.is_none());
    }
}
