use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::{Duration, Instant};

/// When the request entered the redirect router.
#[derive(Copy, Clone, Debug)]
pub struct RequestStart(pub Instant);

impl RequestStart {
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

pub async fn record_request_start(mut request: Request<Body>, next: Next) -> Response {
    request
        .extensions_mut()
        .insert(RequestStart(Instant::now()));
    next.run(request).await
}
