//! HTTP request counter.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};

use replywatch_metrics::{counter, http as http_metrics, labels};

/// Counts requests by route template, method and status.
///
/// Installed as a route layer so the matched template is available and
/// unknown paths do not add label values.
pub async fn http_metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    counter!(
        http_metrics::REQUESTS_TOTAL,
        labels::ENDPOINT => endpoint,
        labels::METHOD => method,
        labels::STATUS => response.status().as_u16().to_string()
    )
    .increment(1);

    response
}
