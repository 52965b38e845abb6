//! `/sessions/*` handlers.

use {
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::Response,
    },
    serde::Deserialize,
    serde_json::json,
    tracing::{info, warn},
};

use fastzap_whatsapp::{CreateOutcome, Error as SessionError, ResponseSink, validate_session_id};

use crate::{
    response::{respond, respond_empty},
    state::AppState,
};

const ALREADY_EXISTS: &str = "Session already exists, please use another id.";
const CREATE_FAILED: &str = "Unable to create session.";
const INVALID_ID: &str = "Session id must be a single path segment.";

#[derive(Debug, Deserialize)]
pub struct AddSession {
    pub id: String,
}

pub async fn find(Path(_id): Path<String>) -> Response {
    respond_empty(StatusCode::OK, "Session found.")
}

pub async fn status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let authenticated = state
        .sessions
        .get(&id)
        .is_some_and(|session| session.is_authenticated());
    let status = if authenticated {
        "authenticated"
    } else {
        "unauthenticated"
    };
    respond(StatusCode::OK, "", json!({ "status": status }))
}

/// Create a session and answer with its first outcome: a QR code to scan,
/// a confirmed connection, or a failure.
pub async fn add(State(state): State<AppState>, Json(body): Json<AddSession>) -> Response {
    let id = body.id.trim();
    if id.is_empty() {
        return respond_empty(StatusCode::BAD_REQUEST, "Session id is required.");
    }
    if validate_session_id(id).is_err() {
        return respond_empty(StatusCode::BAD_REQUEST, INVALID_ID);
    }
    if state.sessions.exists(id) {
        return respond_empty(StatusCode::CONFLICT, ALREADY_EXISTS);
    }

    let (sink, outcome) = ResponseSink::channel();
    match state.sessions.create(id, Some(sink)).await {
        Ok(()) => {},
        Err(SessionError::Conflict { .. }) => {
            return respond_empty(StatusCode::CONFLICT, ALREADY_EXISTS);
        },
        Err(SessionError::InvalidSessionId { .. }) => {
            return respond_empty(StatusCode::BAD_REQUEST, INVALID_ID);
        },
        Err(e) => {
            warn!(session_id = id, error = %e, "session creation failed");
            return respond_empty(StatusCode::INTERNAL_SERVER_ERROR, CREATE_FAILED);
        },
    }

    match tokio::time::timeout(state.create_timeout, outcome).await {
        Ok(Ok(CreateOutcome::Challenge { qr })) => respond(
            StatusCode::OK,
            "QR code received, please scan the QR code.",
            json!({ "qr": qr }),
        ),
        Ok(Ok(CreateOutcome::Connected)) => {
            respond_empty(StatusCode::OK, "Session connected.")
        },
        Ok(Ok(CreateOutcome::Failed { message })) => {
            respond_empty(StatusCode::INTERNAL_SERVER_ERROR, message)
        },
        Ok(Err(_)) => respond_empty(StatusCode::INTERNAL_SERVER_ERROR, CREATE_FAILED),
        Err(_) => {
            info!(session_id = id, "no creation outcome before timeout");
            respond_empty(StatusCode::GATEWAY_TIMEOUT, "Session is still connecting.")
        },
    }
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if validate_session_id(&id).is_err() {
        warn!(session_id = %id, "rejecting delete of path-like session id");
        return respond_empty(StatusCode::BAD_REQUEST, INVALID_ID);
    }
    state.sessions.delete(&id).await;
    respond_empty(StatusCode::OK, "The session has been successfully deleted.")
}
