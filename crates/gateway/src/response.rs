//! The `{success, message, data}` envelope every endpoint answers with.

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Serialize,
    serde_json::{Value, json},
};

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub data: Value,
}

pub fn respond(status: StatusCode, message: impl Into<String>, data: Value) -> Response {
    let body = ApiResponse {
        success: status.is_success(),
        message: message.into(),
        data,
    };
    (status, Json(body)).into_response()
}

/// Envelope without payload; `data` is an empty object.
pub fn respond_empty(status: StatusCode, message: impl Into<String>) -> Response {
    respond(status, message, json!({}))
}
