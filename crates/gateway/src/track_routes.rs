//! `/api/track` routes: widget analytics events and usage summaries.

use {
    axum::{
        Extension, Json,
        extract::{
            Query, State,
            rejection::{JsonRejection, QueryRejection},
        },
        response::{IntoResponse, Response},
    },
    hookgate_auth::Caller,
    hookgate_common::time::{now_ms, parse_rfc3339, to_rfc3339, utc_date},
    serde::Deserialize,
    serde_json::{Map, Value, json},
};

use crate::{
    api_key_middleware::resolve_user,
    embed_routes::WIDGET_PLUGIN_ID,
    error::{ApiError, ApiResult},
    event_store::{EventQuery, NewEvent},
    server::AppState,
    usage_routes::{id_value, non_empty, page_limit},
    usage_store::{UsageEvent, UsageQuery},
};

/// Event type that also counts as a billed request.
pub const MESSAGE_SENT: &str = "message_sent";
pub const TRACK_ENDPOINT: &str = "/api/track";

#[derive(Debug, Default, Deserialize)]
pub struct TrackRequest {
    pub event: Option<String>,
    pub data: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventParams {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub event_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryParams {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub plugin_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn take_string(data: &mut Map<String, Value>, key: &str) -> Option<String> {
    match data.remove(key)? {
        Value::String(s) => non_empty(Some(s)),
        _ => None,
    }
}

/// JavaScript truthiness, which is what widgets send `count` with.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    }
}

/// Store a widget event. `message_sent` events carrying a `count` also add a
/// request to the day's usage.
pub async fn track_event(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<TrackRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (Some(event_type), Some(mut data)) = (non_empty(body.event), body.data) else {
        return Err(ApiError::bad_request("Missing required parameters"));
    };
    let Some(agent_id) = id_value(data.remove("agentId")) else {
        return Err(ApiError::bad_request("Missing required parameters"));
    };
    let requested_user = take_string(&mut data, "userId");
    let user_id = resolve_user(
        &caller,
        requested_user.as_deref(),
        "You don't have permission to track events for this user",
    )?;

    let now = now_ms();
    let timestamp = match take_string(&mut data, "timestamp") {
        Some(raw) => parse_rfc3339(&raw)
            .map(to_rfc3339)
            .ok_or_else(|| ApiError::bad_request("Invalid timestamp"))?,
        None => to_rfc3339(now),
    };
    let visitor_id = take_string(&mut data, "visitorId").unwrap_or_else(|| user_id.clone());
    let url = take_string(&mut data, "url");
    let referrer = take_string(&mut data, "referrer");
    let billed = event_type == MESSAGE_SENT && truthy(data.get("count"));

    let stores = &state.gateway.stores;
    stores
        .events
        .record(NewEvent {
            event_type,
            agent_id: agent_id.clone(),
            user_id: user_id.clone(),
            visitor_id,
            url,
            referrer,
            timestamp,
            data: Value::Object(data),
        })
        .await
        .map_err(|e| ApiError::internal("Failed to track event", e))?;

    if billed {
        stores
            .usage
            .track(UsageEvent {
                user_id,
                agent_id,
                plugin_id: WIDGET_PLUGIN_ID.into(),
                endpoint: TRACK_ENDPOINT.into(),
                date: utc_date(now),
                tokens: 0,
            })
            .await
            .map_err(|e| ApiError::internal("Failed to track event", e))?;
    }
    Ok(Json(json!({ "success": true })).into_response())
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    params: Result<Query<EventParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let user_id = resolve_user(
        &caller,
        params.user_id.as_deref(),
        "You don't have permission to view events for this user",
    )?;
    let query = EventQuery {
        user_id,
        agent_id: non_empty(params.agent_id),
        event_type: non_empty(params.event_type),
        start: non_empty(params.start_date),
        end: non_empty(params.end_date),
        limit: page_limit(params.limit),
    };
    let events = state
        .gateway
        .stores
        .events
        .query(&query)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve events", e))?;
    Ok(Json(json!({ "events": events })).into_response())
}

pub async fn usage_summary(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<SummaryParams>,
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
        .summarize(&query)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve usage summary", e))?;
    Ok(Json(json!({ "usage": usage })).into_response())
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(json!(1), true)]
    #[case(json!(0), false)]
    #[case(json!(0.5), true)]
    #[case(json!("3"), true)]
    #[case(json!(""), false)]
    #[case(json!(false), false)]
    #[case(json!(null), false)]
    fn count_truthiness(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(truthy(Some(&value)), expected);
    }

    #[test]
    fn missing_count_is_not_billed() {
        assert!(!truthy(None));
    }

    #[test]
    fn known_fields_are_lifted_out_of_data() {
        let mut data = json!({
            "userId": "u1",
            "url": "",
            "referrer": 7,
            "count": 2
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        assert_eq!(take_string(&mut data, "userId").as_deref(), Some("u1"));
        assert_eq!(take_string(&mut data, "url"), None);
        assert_eq!(take_string(&mut data, "referrer"), None);
        assert_eq!(Value::Object(data), json!({ "count": 2 }));
    }
}
