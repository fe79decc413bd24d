//! Minimal admin HTTP surface. Everything about request decoding, HTML
//! rendering, and the websocket fan-out this would have in a full product
//! is out of scope; this module implements just enough of the contract
//! (list/new/create/cancel/reschedule) to make the dispatch engine
//! reachable at runtime.

mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::scheduler::Scheduler;
use crate::store::JobStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub scheduler: Arc<Scheduler>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::list_jobs))
        .route("/health", get(routes::health))
        .route("/jobs", post(routes::create_job))
        .route("/jobs/:id/cancel", post(routes::cancel_job))
        .route("/maintenance/reschedule", post(routes::reschedule))
        .with_state(state)
}
