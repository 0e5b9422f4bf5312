//! `/api/usage` routes: per-day request and token counters.

use {
    axum::{
        Extension, Json,
        extract::{Query, State, rejection::JsonRejection},
        response::{IntoResponse, Response},
    },
    hookgate_auth::Caller,
    hookgate_common::time::{now_ms, utc_date},
    serde::Deserialize,
    serde_json::{Value, json},
};

use crate::{
    api_key_middleware::resolve_user,
    error::{ApiError, ApiResult},
    server::AppState,
    usage_store::{DEFAULT_BUCKET, UsageEvent, UsageQuery},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackUsageRequest {
    pub user_id: Option<String>,
    /// String or number.
    pub agent_id: Option<Value>,
    pub plugin_id: Option<String>,
    pub endpoint: Option<String>,
    pub tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageParams {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub plugin_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Default and maximum page size for listings.
pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

/// Agent ids arrive as strings or numbers.
pub(crate) fn id_value(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn page_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn bucket(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BUCKET.to_string())
}

pub async fn track_usage(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<TrackUsageRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (Some(user_id), Some(agent_id)) = (
        non_empty(body.user_id),
        id_value(body.agent_id),
    ) else {
        return Err(ApiError::bad_request("Missing required parameters"));
    };
    if !caller.can_act_for(&user_id) {
        return Err(ApiError::forbidden(
            "You don't have permission to track usage for this user",
        ));
    }

    let event = UsageEvent {
        user_id,
        agent_id,
        plugin_id: bucket(body.plugin_id),
        endpoint: bucket(body.endpoint),
        date: utc_date(now_ms()),
        tokens: i64::from(body.tokens.unwrap_or(0)),
    };
    state
        .gateway
        .stores
        .usage
        .track(event)
        .await
        .map_err(|e| ApiError::internal("Failed to track API usage", e))?;
    Ok(Json(json!({ "success": true })).into_response())
}

pub async fn get_usage(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<UsageParams>,
) -> ApiResult<Response> {
    let user_id = resolve_user(
        &caller,
        params.user_id.as_deref(),
        "You don't have permission to view usage for this user",
    )?;
    let query = UsageQuery {
        user_id,
        agent_id: non_empty(params.agent_id),
        plugin_id: non_empty(params.plugin_id),
        start_date: non_empty(params.start_date),
        end_date: non_empty(params.end_date),
    };
    let usage = state
        .gateway
        .stores
        .usage
        .query(&query)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve API usage", e))?;
    Ok(Json(json!({ "usage": usage })).into_response())
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(json!("agent-1"), Some("agent-1"))]
    #[case(json!(42), Some("42"))]
    #[case(json!(""), None)]
    #[case(json!(null), None)]
    #[case(json!({"id": 1}), None)]
    fn agent_ids(#[case] value: Value, #[case] expected: Option<&str>) {
        assert_eq!(id_value(Some(value)).as_deref(), expected);
    }

    #[rstest]
    #[case(None, DEFAULT_LIMIT)]
    #[case(Some(0), 1)]
    #[case(Some(25), 25)]
    #[case(Some(50_000), MAX_LIMIT)]
    fn limits(#[case] requested: Option<u32>, #[case] expected: u32) {
        assert_eq!(page_limit(requested), expected);
    }
}
