//! Rendezvous HTTP handlers: registry operations as JSON envelopes.

pub mod fingerprint;
pub mod peer;
pub mod provider;
pub mod server_id;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use burrow_core::wire::{auth_digest, StatusResp};
use burrow_services::{DirectoryError, PeerDirectory, ServerIdSlot};

#[derive(Clone)]
pub struct ApiState {
    pub directory: Arc<PeerDirectory>,
    pub server_id: ServerIdSlot,
    /// Expected value of the `auth` header.
    pub digest: Arc<str>,
}

impl ApiState {
    pub fn new(secret: &str) -> Self {
        Self {
            directory: Arc::new(PeerDirectory::new()),
            server_id: ServerIdSlot::new(),
            digest: auth_digest(secret).into(),
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// A `{"status": false}` answer with the given HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failed(pub StatusCode);

impl IntoResponse for Failed {
    fn into_response(self) -> Response {
        (self.0, Json(StatusResp::FAILED)).into_response()
    }
}

impl From<DirectoryError> for Failed {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::InvalidAddrs(_) => Failed(StatusCode::INTERNAL_SERVER_ERROR),
            DirectoryError::PeerNotFound
            | DirectoryError::NamespaceNotFound
            | DirectoryError::FingerprintNotFound => Failed(StatusCode::NOT_FOUND),
        }
    }
}

// Re-export handler functions for use in router setup.
pub use fingerprint::{handle_delete_fingerprint, handle_get_peer_id};
pub use peer::{handle_get_peer, handle_new_peer};
pub use provider::handle_get_provider;
pub use server_id::{handle_get_server_id, handle_set_server_id};
