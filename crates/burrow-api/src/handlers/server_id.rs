//! /route/server-id: the relay peer's identity.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use burrow_core::addr::PeerId;
use burrow_core::wire::{IdResp, StatusResp};

use super::{ApiState, Failed};

pub async fn handle_get_server_id(State(state): State<ApiState>) -> Json<IdResp> {
    Json(IdResp {
        peer_id: state.server_id.get(),
    })
}

/// Last write wins. Any holder of the secret may set it.
pub async fn handle_set_server_id(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResp>, Failed> {
    let id: PeerId = id
        .parse()
        .map_err(|_| Failed(StatusCode::INTERNAL_SERVER_ERROR))?;
    tracing::info!(server_id = %id, "server id set");
    state.server_id.set(id);
    Ok(Json(StatusResp::OK))
}
