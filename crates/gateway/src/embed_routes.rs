//! `/api/embed` routes used by the website chat widget's backend.

use {
    askama::Template,
    axum::{
        Extension, Json,
        extract::{
            Query, State,
            rejection::{JsonRejection, QueryRejection},
        },
        response::{IntoResponse, Response},
    },
    hookgate_auth::Caller,
    hookgate_common::time::{now_ms, to_rfc3339, utc_date},
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::debug,
};

use crate::{
    api_key_middleware::resolve_user,
    error::{ApiError, ApiResult},
    interaction_store::{InteractionQuery, NewInteraction},
    server::AppState,
    usage_routes::{id_value, non_empty, page_limit},
    usage_store::UsageEvent,
};

/// Plugin id under which widget traffic is logged and billed.
pub const WIDGET_PLUGIN_ID: &str = "web-widget";
pub const CHAT_ENDPOINT: &str = "/api/embed/chat";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLogRequest {
    pub agent_id: Option<Value>,
    pub user_id: Option<String>,
    /// Defaults to the user id.
    pub visitor_id: Option<String>,
    pub message: Option<String>,
    pub response: Option<String>,
    pub tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionParams {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub visitor_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedCodeParams {
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    pub primary_color: Option<String>,
    pub position: Option<String>,
    pub title: Option<String>,
    pub auto_open: Option<String>,
}

#[derive(Template)]
#[template(path = "embed_snippet.html", escape = "html")]
struct EmbedSnippet<'a> {
    script_url: &'a str,
    agent_id: &'a str,
    user_id: &'a str,
    primary_color: Option<&'a str>,
    position: Option<&'a str>,
    title: Option<&'a str>,
    auto_open: Option<&'a str>,
}

/// Log one widget exchange and, when it used tokens, bill it.
pub async fn log_chat(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ChatLogRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (Some(agent_id), Some(user_id), Some(message), Some(response)) = (
        id_value(body.agent_id),
        non_empty(body.user_id),
        non_empty(body.message),
        non_empty(body.response),
    ) else {
        return Err(ApiError::bad_request("Missing required parameters"));
    };
    if !caller.can_act_for(&user_id) {
        return Err(ApiError::forbidden(
            "You don't have permission to log interactions for this user",
        ));
    }

    let now = now_ms();
    let tokens = i64::from(body.tokens.unwrap_or(0));
    let stores = &state.gateway.stores;
    stores
        .interactions
        .record(NewInteraction {
            agent_id: agent_id.clone(),
            visitor_id: non_empty(body.visitor_id).unwrap_or_else(|| user_id.clone()),
            user_id: user_id.clone(),
            plugin_id: WIDGET_PLUGIN_ID.into(),
            message,
            response,
            tokens,
            timestamp: to_rfc3339(now),
        })
        .await
        .map_err(|e| ApiError::internal("Failed to log interaction", e))?;

    if tokens > 0 {
        stores
            .usage
            .track(UsageEvent {
                user_id,
                agent_id,
                plugin_id: WIDGET_PLUGIN_ID.into(),
                endpoint: CHAT_ENDPOINT.into(),
                date: utc_date(now),
                tokens,
            })
            .await
            .map_err(|e| ApiError::internal("Failed to log interaction", e))?;
    }
    Ok(Json(json!({ "success": true })).into_response())
}

pub async fn list_interactions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    params: Result<Query<InteractionParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let user_id = resolve_user(
        &caller,
        params.user_id.as_deref(),
        "You don't have permission to view interactions for this user",
    )?;
    let query = InteractionQuery {
        user_id,
        agent_id: non_empty(params.agent_id),
        visitor_id: non_empty(params.visitor_id),
        start: non_empty(params.start_date),
        end: non_empty(params.end_date),
        limit: page_limit(params.limit),
    };
    let interactions = state
        .gateway
        .stores
        .interactions
        .query(&query)
        .await
        .map_err(|e| ApiError::internal("Failed to retrieve interactions", e))?;
    Ok(Json(json!({ "interactions": interactions })).into_response())
}

/// HTML snippet that loads the widget for an agent.
pub async fn embed_code(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<EmbedCodeParams>,
) -> ApiResult<Response> {
    let Some(agent_id) = non_empty(params.agent_id) else {
        return Err(ApiError::bad_request("Missing required parameters"));
    };
    let user_id = resolve_user(
        &caller,
        params.user_id.as_deref(),
        "You don't have permission to generate embed code for this user",
    )?;

    let script_url = state.gateway.config.embed.script_url();
    let primary_color = non_empty(params.primary_color);
    let position = non_empty(params.position);
    let title = non_empty(params.title);
    let auto_open = non_empty(params.auto_open);
    let snippet = EmbedSnippet {
        script_url: &script_url,
        agent_id: &agent_id,
        user_id: &user_id,
        primary_color: primary_color.as_deref(),
        position: position.as_deref(),
        title: title.as_deref(),
        auto_open: auto_open.as_deref(),
    };
    let embed_code = snippet
        .render()
        .map_err(|e| ApiError::internal("Failed to generate embed code", e))?;
    debug!(%agent_id, %user_id, "embed code generated");
    Ok(Json(json!({ "embedCode": embed_code.trim() })).into_response())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn snippet<'a>(title: Option<&'a str>, position: Option<&'a str>) -> String {
        EmbedSnippet {
            script_url: "https://app.example.com/api/embed/enhanced-chatbot.js",
            agent_id: "a1",
            user_id: "u1",
            primary_color: None,
            position,
            title,
            auto_open: None,
        }
        .render()
        .unwrap()
    }

    #[test]
    fn optional_attributes_are_omitted() {
        let html = snippet(None, None);
        assert!(html.contains(r#"src="https://app.example.com/api/embed/enhanced-chatbot.js""#));
        assert!(html.contains(r#"data-agent-id="a1""#));
        assert!(html.contains(r#"data-user-id="u1""#));
        assert!(!html.contains("data-title"));
        assert!(!html.contains("data-position"));
        assert!(html.contains("></script>"));
    }

    #[test]
    fn attribute_values_are_escaped() {
        let html = snippet(Some(r#"Help" onload="alert(1)"#), Some("bottom-left"));
        assert!(html.contains(r#"data-position="bottom-left""#));
        assert!(html.contains("data-title="));
        assert!(!html.contains(r#"onload="alert(1)""#));
    }
}
