//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The side-table server exposes one resource, a named JSON document, plus a
//! health probe. Panels and the tag editor reach it through `HttpStore`.

pub mod sidetables;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/sidetables/{table}",
            get(sidetables::get_table).put(sidetables::put_table),
        )
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
