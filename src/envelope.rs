//! The JSON envelopes every API response is wrapped in.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// A successful response carrying `data`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    /// The payload.
    pub data: T,
}

/// Respond with `{ "data": data }` and `status`.
pub fn data_response<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(DataEnvelope { data })).into_response()
}

/// Respond with `{ "data": data }` and 200 OK.
pub fn ok<T: Serialize>(data: T) -> Response {
    data_response(StatusCode::OK, data)
}

/// Respond with `{ "data": data }` and 201 Created.
pub fn created<T: Serialize>(data: T) -> Response {
    data_response(StatusCode::CREATED, data)
}

/// Respond with `{ "success": true }` and 200 OK.
pub fn success() -> Response {
    Json(serde_json::json!({ "success": true })).into_response()
}

/// Treat empty strings from JSON bodies and query strings as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
