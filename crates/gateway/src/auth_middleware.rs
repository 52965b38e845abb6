use axum::{
    extract::{Path, Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use secrecy::ExposeSecret;

use crate::{response::respond_empty, state::AppState};

/// Require the configured token in the `Authorization` header, either raw
/// or as `Bearer <token>`.
///
/// A missing header is rejected with 403 and a wrong token with 401. When
/// no token is configured every request passes.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return next.run(request).await;
    };

    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return respond_empty(StatusCode::FORBIDDEN, "No token sent!");
    };
    let presented = header.to_str().unwrap_or_default();
    let presented = presented.strip_prefix("Bearer ").unwrap_or(presented);

    if !constant_time_eq(presented, expected.expose_secret()) {
        return respond_empty(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    next.run(request).await
}

/// Reject requests addressing a session id that is not registered.
pub async fn require_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Request,
    next: Next,
) -> Response {
    if !state.sessions.exists(&id) {
        return respond_empty(StatusCode::NOT_FOUND, "Session not found.");
    }
    next.run(request).await
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_whole_token() {
        assert!(constant_time_eq("s3cret", "s3cret"));
        assert!(!constant_time_eq("s3cret", "s3creT"));
        assert!(!constant_time_eq("s3cret", "s3cret!"));
        assert!(!constant_time_eq("", "s3cret"));
    }
}
