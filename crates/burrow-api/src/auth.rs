//! Shared-secret gate in front of every rendezvous route.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use burrow_core::wire::AUTH_HEADER;

use crate::handlers::{ApiState, Failed};

/// Reject with 401 `{"status": false}` unless the `auth` header carries the
/// expected digest. Runs before any handler touches the directory.
pub async fn require_auth(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let presented = req
        .headers()
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented != Some(&*state.digest) {
        tracing::warn!(
            method = %req.method(),
            path = %req.uri().path(),
            "unauthorized rendezvous request"
        );
        return Failed(StatusCode::UNAUTHORIZED).into_response();
    }
    next.run(req).await
}
