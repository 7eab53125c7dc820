//! Request Handlers
//!
//! The axum routes in front of the storage engine.
//!
//! ## Routes
//!
//! - `POST /` - Write a payload, respond `201 {"key": ...}`
//! - `GET /` - Read a key, respond `200` with the record (or the empty record)
//! - anything else - `404 {"message": "not found"}`
//!
//! Bodies are taken as raw bytes and decoded by [`wire`](crate::commands::wire),
//! so clients do not need to send a `Content-Type` header. Decoding failures
//! become `400 {"message": ...}` and never reach the engine.

use crate::commands::wire::{
    read_key_from_json, CommandError, MessageBody, RecordBody, WriteCommand, WriteResponse,
};
use crate::storage::{Record, StorageEngine};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::{trace, warn};

/// Body of every 404, byte for byte.
const NOT_FOUND_BODY: &str = r#"{"message": "not found"}"#;

/// Builds the router for `GET /` and `POST /`, sharing `storage` across
/// handlers.
pub fn router(storage: Arc<StorageEngine>) -> Router {
    Router::new()
        .route("/", get(cmd_read).post(cmd_write).fallback(not_found))
        .fallback(not_found)
        .with_state(storage)
}

impl IntoResponse for CommandError {
    fn into_response(self) -> Response {
        warn!(error = %self, "Rejected request");
        let body = MessageBody {
            message: self.to_string(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// POST / {"key", "data", "expiration_date"}
async fn cmd_write(
    State(storage): State<Arc<StorageEngine>>,
    body: Bytes,
) -> Result<(StatusCode, Json<WriteResponse>), CommandError> {
    let cmd = WriteCommand::from_json(&body)?;
    trace!(key = %cmd.key, bytes = cmd.data.len(), "Write");

    let key = storage.write(cmd.key, cmd.data, cmd.expires_at);
    Ok((StatusCode::CREATED, Json(WriteResponse { key })))
}

/// GET / {"key"}
async fn cmd_read(
    State(storage): State<Arc<StorageEngine>>,
    body: Bytes,
) -> Result<Json<RecordBody>, CommandError> {
    let key = read_key_from_json(&body)?;
    trace!(key = %key, "Read");

    let record = storage.read(&key).unwrap_or_else(Record::absent);
    Ok(Json(RecordBody::from(&record)))
}

/// Unknown paths and methods.
async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "application/json")],
        NOT_FOUND_BODY,
    )
}
