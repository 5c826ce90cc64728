//! /route/{key} handlers: look up and register peers.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::{Form, Json};

use burrow_core::addr::{rewrite_loopback, PeerId};
use burrow_core::wire::{Namespace, PeerResp, ProvideForm, StatusResp};

use super::{ApiState, Failed};

// ── /route/{id} (GET) ─────────────────────────────────────────────────────────

pub async fn handle_get_peer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<PeerResp>, Failed> {
    let id: PeerId = id
        .parse()
        .map_err(|_| Failed(StatusCode::INTERNAL_SERVER_ERROR))?;
    let info = state.directory.find(&id)?;
    Ok(Json(PeerResp {
        status: true,
        addr_info: Some(info),
    }))
}

// ── /route/{namespace} (POST) ─────────────────────────────────────────────────

/// Register or overwrite the sender under `namespace`.
///
/// Loopback components in the submitted list are replaced with the address
/// the request arrived from, so a peer that only knows itself as 127.0.0.1
/// is stored under the address the rest of the network can reach.
pub async fn handle_new_peer(
    State(state): State<ApiState>,
    Path(namespace): Path<String>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Form(form): Form<ProvideForm>,
) -> Result<Json<StatusResp>, Failed> {
    let id: PeerId = form.id.parse().map_err(|_| {
        tracing::warn!(id = %form.id, "provide with invalid peer id");
        Failed(StatusCode::INTERNAL_SERVER_ERROR)
    })?;

    let addrs = rewrite_loopback(&form.addrs, remote.ip());
    let namespace = Namespace::from_key(namespace);
    state
        .directory
        .provide(&namespace, &id, &addrs, &form.fingerprint)
        .map_err(|e| {
            tracing::warn!(peer = %id, error = %e, "provide rejected");
            Failed::from(e)
        })?;

    tracing::info!(peer = %id, %remote, namespace = %namespace, "peer registered");
    Ok(Json(StatusResp::OK))
}
