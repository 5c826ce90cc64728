//! /route/fingerprints/{fingerprint}: resolve and forget fingerprints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use burrow_core::wire::{IdResp, StatusResp};

use super::{ApiState, Failed};

// ── GET ───────────────────────────────────────────────────────────────────────

/// `{"peer_id": ...}` with 200, or `{}` with 404.
pub async fn handle_get_peer_id(
    State(state): State<ApiState>,
    Path(fingerprint): Path<String>,
) -> (StatusCode, Json<IdResp>) {
    let peer_id = state.directory.find_peer_id(&fingerprint);
    let status = if peer_id.is_some() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(IdResp { peer_id }))
}

// ── DELETE ────────────────────────────────────────────────────────────────────

pub async fn handle_delete_fingerprint(
    State(state): State<ApiState>,
    Path(fingerprint): Path<String>,
) -> Result<Json<StatusResp>, Failed> {
    state.directory.delete_fingerprint(&fingerprint)?;
    tracing::info!(fingerprint = %fingerprint, "fingerprint logged out");
    Ok(Json(StatusResp::OK))
}

#[cfg(test)]
mod tests {
    use crate::tests::{app, body_json, delete, form_post, get};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn fingerprint_round_trip() {
        let (state, app) = app("198.51.100.9:5000");
        form_post(&app, "/route/ns", "id=QmAlice&addrs=&fingerprint=laptop").await;

        let resp = get(&app, "/route/fingerprints/laptop").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"peer_id": "QmAlice"}));

        let resp = delete(&app, "/route/fingerprints/laptop").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"status": true}));

        let resp = get(&app, "/route/fingerprints/laptop").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await, json!({}));

        // Logging out leaves the peer record alone.
        assert_eq!(state.directory.peer_count(), 1);
    }

    #[tokio::test]
    async fn deleting_unknown_fingerprint_is_404() {
        let (_, app) = app("198.51.100.9:5000");
        let resp = delete(&app, "/route/fingerprints/ghost").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await, json!({"status": false}));
    }
}
