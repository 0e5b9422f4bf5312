use std::collections::HashMap;

use {
    axum::{
        body::Body,
        extract::{Query, State},
        http::Request,
        middleware::Next,
        response::{IntoResponse, Response},
    },
    hookgate_auth::Caller,
    hookgate_common::time::now_ms,
    tracing::debug,
};

use crate::{error::ApiError, server::AppState};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY: &str = "api_key";

/// Require a valid API key. The resolved [`hookgate_auth::Caller`] is placed
/// in the request extensions for downstream handlers.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let presented = presented_key(&request);
    match state
        .gateway
        .key_gate
        .authenticate(presented.as_deref(), now_ms())
        .await
    {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        },
        Err(e) => {
            debug!(path = request.uri().path(), reason = e.reason(), "api key rejected");
            ApiError::from(e).into_response()
        },
    }
}

/// Resolve the user a request acts on. Users default to themselves; the
/// system caller must name one. `denied` is the 403 message.
pub(crate) fn resolve_user(
    caller: &Caller,
    requested: Option<&str>,
    denied: &str,
) -> Result<String, ApiError> {
    match requested.map(str::trim).filter(|u| !u.is_empty()) {
        Some(user_id) if caller.can_act_for(user_id) => Ok(user_id.to_string()),
        Some(_) => Err(ApiError::forbidden(denied)),
        None if caller.is_system() => Err(ApiError::bad_request("userId is required")),
        None => Ok(caller.user_id().to_string()),
    }
}

/// `X-Api-Key` header, falling back to the `api_key` query parameter.
fn presented_key(request: &Request<Body>) -> Option<String> {
    let header = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(key) = header {
        return Some(key.to_string());
    }
    Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove(API_KEY_QUERY))
        .filter(|v| !v.is_empty())
}
