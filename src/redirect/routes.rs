use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::tracking::Tracker;

use super::handlers::{health_check, track_and_redirect, RedirectState};
use super::middleware::record_request_start;

pub fn create_redirect_router(tracker: Arc<Tracker>) -> Router {
    let state = Arc::new(RedirectState { tracker });

    Router::new()
        .route("/", get(health_check))
        .route("/{slug}", get(track_and_redirect))
        .layer(middleware::from_fn(record_request_start))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
