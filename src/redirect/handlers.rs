use axum::{
    extract::{ConnectInfo, OriginalUri, State},
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        StatusCode,
    },
    response::{Html, IntoResponse, Response},
    Extension, Json,
};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error};

use super::middleware::RequestStart;
use crate::analytics::extract_client_ip;
use crate::tracking::{ClickRequest, TrackOutcome, Tracker};

const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";
const LOOKUP_FAILED_MESSAGE: &str = "An error occurred. Please try again later.";

const NOT_FOUND_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>404 - Page Not Found</title>
</head>
<body style="font-family: system-ui, sans-serif; text-align: center; padding: 4rem 1rem;">
    <h1>404</h1>
    <h2>Page Not Found</h2>
    <p>The link you're looking for doesn't exist or has been deactivated.</p>
    <a href="/">Go Back Home</a>
</body>
</html>
"#;

pub struct RedirectState {
    pub tracker: Arc<Tracker>,
}

/// Track the visit and send the visitor on to the link's destination
pub async fn track_and_redirect(
    State(state): State<Arc<RedirectState>>,
    Extension(request_start): Extension<RequestStart>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    let request = ClickRequest {
        slug: raw_slug(uri.path()),
        client_ip: extract_client_ip(&headers, addr.ip()),
        user_agent: header_value(&headers, header::USER_AGENT)
            .unwrap_or_else(|| "Unknown".to_string()),
        referrer: header_value(&headers, header::REFERER),
        query_string: uri.query().filter(|q| !q.is_empty()).map(str::to_string),
        request_uri: uri.path_and_query().map(|pq| pq.as_str().to_string()),
        accept_language: header_value(&headers, header::ACCEPT_LANGUAGE),
    };

    let outcome = state.tracker.track(request).await;

    debug!(
        elapsed_ms = request_start.elapsed().as_millis() as u64,
        ?outcome,
        "tracked request"
    );

    match outcome {
        TrackOutcome::Redirect { target, .. } => found(&target),
        TrackOutcome::NotFound => (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response(),
        TrackOutcome::LookupFailed => {
            (StatusCode::INTERNAL_SERVER_ERROR, LOOKUP_FAILED_MESSAGE).into_response()
        }
    }
}

/// 302 that no browser or proxy should cache
fn found(target: &str) -> Response {
    let location = match HeaderValue::from_str(target) {
        Ok(value) => value,
        Err(e) => {
            error!(location = %target, error = %e, "redirect target is not a valid header value");
            return (StatusCode::INTERNAL_SERVER_ERROR, LOOKUP_FAILED_MESSAGE).into_response();
        }
    };

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location),
            (header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE)),
            (header::PRAGMA, HeaderValue::from_static("no-cache")),
        ],
    )
        .into_response()
}

/// Percent-decoded path segment. Invalid UTF-8 becomes U+FFFD, which the
/// slug sanitiser drops like any other disallowed character.
fn raw_slug(path: &str) -> String {
    percent_decode_str(path.trim_start_matches('/'))
        .decode_utf8_lossy()
        .into_owned()
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_slug_decodes_lossily() {
        assert_eq!(raw_slug("/winter-boots"), "winter-boots");
        assert_eq!(raw_slug("/%3Cscript%3E"), "<script>");
        assert_eq!(raw_slug("/winter-boots%FF"), "winter-boots\u{FFFD}");
        assert_eq!(
            crate::tracking::sanitize_slug(&raw_slug("/winter-boots%FF")),
            "winter-boots"
        );
        assert_eq!(crate::tracking::sanitize_slug(&raw_slug("/%FF")), "");
    }
}
