//! /route/providers/{namespace}: list a provider group.

use axum::extract::{Path, State};
use axum::Json;

use burrow_core::wire::{Namespace, ProvidersResp};

use super::{ApiState, Failed};

pub async fn handle_get_provider(
    State(state): State<ApiState>,
    Path(namespace): Path<String>,
) -> Result<Json<ProvidersResp>, Failed> {
    let group = state
        .directory
        .find_providers(&Namespace::from_key(namespace))?;
    Ok(Json(ProvidersResp {
        status: true,
        addr_infos: Some(group),
    }))
}
