//! HTTP request metrics middleware.
//!
//! Records `hookgate_http_requests_total` and
//! `hookgate_http_request_duration_seconds` for every request, labelled by
//! the matched route template so path parameters never become label values.

use std::time::Instant;

use {
    axum::{
        body::Body,
        extract::MatchedPath,
        http::Request,
        middleware::Next,
        response::Response,
    },
    hookgate_metrics::{counter, histogram, http as http_metrics, labels},
};

const UNMATCHED: &str = "unmatched";

pub async fn http_metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = endpoint_label(request.extensions().get::<MatchedPath>());

    let response = next.run(request).await;
    let status = response.status().as_u16().to_string();

    counter!(
        http_metrics::REQUESTS_TOTAL,
        labels::ENDPOINT => endpoint.clone(),
        labels::METHOD => method.clone(),
        labels::STATUS => status.clone()
    )
    .increment(1);
    histogram!(
        http_metrics::REQUEST_DURATION_SECONDS,
        labels::ENDPOINT => endpoint,
        labels::METHOD => method,
        labels::STATUS => status
    )
    .record(start.elapsed().as_secs_f64());

    response
}

fn endpoint_label(matched: Option<&MatchedPath>) -> String {
    matched.map_or_else(|| UNMATCHED.to_string(), |p| p.as_str().to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{Router, routing::get},
        tower::ServiceExt,
    };

    async fn label_for(uri: &str) -> String {
        let app = Router::new()
            .route(
                "/webhooks/{platform}",
                get(|matched: MatchedPath| async move { matched.as_str().to_string() }),
            )
            .fallback(|| async { UNMATCHED });
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn route_template_is_the_label() {
        assert_eq!(label_for("/webhooks/whatsapp").await, "/webhooks/{platform}");
        assert_eq!(label_for("/nowhere").await, UNMATCHED);
    }

    #[test]
    fn missing_match_is_unmatched() {
        assert_eq!(endpoint_label(None), UNMATCHED);
    }
}
