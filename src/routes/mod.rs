//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The realtime server exposes exactly two endpoints: the websocket upgrade
//! at `/ws` and a health check at `/healthz`. Account, login and room CRUD
//! live in a separate HTTP service that shares the database.

pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
