//! `/api/keys` routes: list, mint, revoke and verify API keys.

use {
    axum::{
        Extension, Json,
        extract::{Path, Query, State, rejection::JsonRejection},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    hookgate_auth::{ApiKeyRecord, Caller, KeyCheck},
    hookgate_common::time::{now_ms, parse_rfc3339, to_rfc3339},
    serde::Deserialize,
    serde_json::json,
    tracing::info,
};

#[cfg(feature = "metrics")]
use hookgate_metrics::{api_keys as key_metrics, counter};

use crate::{
    api_key_middleware::resolve_user,
    error::{ApiError, ApiResult},
    server::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListKeysQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    pub user_id: Option<String>,
    pub name: Option<String>,
    /// RFC 3339 timestamp.
    pub expires_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyKeyRequest {
    pub api_key: Option<String>,
}

pub async fn list_keys(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListKeysQuery>,
) -> ApiResult<Response> {
    let user_id = resolve_user(
        &caller,
        query.user_id.as_deref(),
        "You don't have permission to view these API keys",
    )?;
    let keys = state
        .gateway
        .stores
        .api_keys
        .list_for_user(&user_id)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve API keys", e))?;
    let keys: Vec<_> = keys.iter().map(ApiKeyRecord::view).collect();
    Ok(Json(json!({ "keys": keys })).into_response())
}

pub async fn create_key(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CreateKeyRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let user_id = resolve_user(
        &caller,
        body.user_id.as_deref(),
        "You don't have permission to create API keys for this user",
    )?;
    let expires_at = match body.expires_at.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_rfc3339(raw).ok_or_else(|| {
            ApiError::bad_request("expiresAt must be an RFC 3339 timestamp")
        })?),
        None => None,
    };

    let (record, raw_key) = ApiKeyRecord::mint(user_id, body.name, expires_at, now_ms());
    state
        .gateway
        .stores
        .api_keys
        .create(record.clone())
        .await
        .map_err(|e| ApiError::internal("Failed to create API key", e))?;

    info!(key_id = %record.id, user_id = %record.user_id, "api key created");
    #[cfg(feature = "metrics")]
    counter!(key_metrics::CREATED_TOTAL).increment(1);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": record.id,
            "user_id": record.user_id,
            "api_key": raw_key,
            "name": record.name,
            "created_at": to_rfc3339(record.created_at),
            "expires_at": record.expires_at.map(to_rfc3339),
        })),
    )
        .into_response())
}

pub async fn delete_key(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let store = &state.gateway.stores.api_keys;
    let record = store
        .get(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete API key", e))?
        .ok_or_else(|| ApiError::not_found("API key not found"))?;
    if !caller.can_act_for(&record.user_id) {
        return Err(ApiError::forbidden(
            "You don't have permission to delete this API key",
        ));
    }
    store
        .delete(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete API key", e))?;

    info!(key_id = %id, user_id = %record.user_id, "api key revoked");
    #[cfg(feature = "metrics")]
    counter!(key_metrics::REVOKED_TOTAL).increment(1);

    Ok(Json(json!({ "success": true })).into_response())
}

/// Public: report whether a key is usable without failing the request.
pub async fn verify_key(
    State(state): State<AppState>,
    body: Result<Json<VerifyKeyRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let key = body
        .ok()
        .and_then(|Json(b)| b.api_key)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::bad_request("API key is required"))?;

    let check = state
        .gateway
        .key_gate
        .check(&key, now_ms())
        .await
        .map_err(|e| ApiError::internal("Failed to verify API key", e))?;
    let body = match check {
        KeyCheck::Valid(caller) => json!({ "valid": true, "user": caller.summary() }),
        KeyCheck::Expired => json!({ "valid": false, "expired": true }),
        KeyCheck::Unknown => json!({ "valid": false }),
    };
    Ok(Json(body).into_response())
}
