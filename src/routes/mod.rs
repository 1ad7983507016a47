pub mod connectivity;
pub mod downtime;
pub mod outbox;
pub mod session;
pub mod status;

use axum::Router;
use axum::routing::{get, post, put};

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Submissions
        .route("/api/downtime", post(downtime::submit))
        // Outbox
        .route("/api/outbox", get(outbox::list).post(outbox::queue))
        .route("/api/outbox/sync", post(outbox::sync))
        .route("/api/outbox/{id}", get(outbox::get).delete(outbox::abandon))
        // Session
        .route("/api/session", put(session::set).delete(session::clear))
        // Status
        .route("/api/connectivity", post(connectivity::set))
        .route("/api/status", get(status::status))
}
