//! Side-table routes — load and store named JSON documents.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::Value;
use tracing::warn;

use crate::error::ErrorCode;
use crate::services::persistence::PersistError;
use crate::state::AppState;

/// `GET /api/sidetables/:table` — stored document, or 404 if never saved.
pub async fn get_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let document = state
        .store
        .load(&table)
        .await
        .map_err(|e| persist_error_to_status(&table, e))?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(document))
}

/// `PUT /api/sidetables/:table` — replace the document.
pub async fn put_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(document): Json<Value>,
) -> Result<StatusCode, StatusCode> {
    state
        .store
        .save(&table, &document)
        .await
        .map_err(|e| persist_error_to_status(&table, e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn persist_error_to_status(table: &str, err: PersistError) -> StatusCode {
    let status = match err {
        PersistError::InvalidTable(_) => StatusCode::BAD_REQUEST,
        // A stored file that no longer parses is a server-side problem.
        PersistError::Decode(_)
        | PersistError::Io(_)
        | PersistError::Request(_)
        | PersistError::Status { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, code = err.error_code(), retryable = err.retryable(), table, "side-table request failed");
    }
    status
}

#[cfg(test)]
#[path = "sidetables_test.rs"]
mod tests;
