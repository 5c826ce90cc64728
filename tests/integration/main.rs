//! Burrow integration test harness.
//!
//! Every test starts its own rendezvous server on an ephemeral loopback port
//! and talks to it through the real HTTP client, so tests are independent
//! and need no external setup:
//!
//!   cargo test --test integration

use std::sync::Arc;

use anyhow::Result;

use burrow_api::ApiState;
use burrow_client::RendezvousClient;
use burrow_core::addr::PeerId;
use burrow_services::TcpHost;

pub const SECRET: &str = "integration-secret";

// ── Harness ───────────────────────────────────────────────────────────────────

/// A rendezvous server running in this process.
pub struct Server {
    pub url: String,
    pub state: ApiState,
}

/// Start a server on an ephemeral port. It lives until the runtime ends.
pub async fn start_server() -> Result<Server> {
    let listener = burrow_api::bind(0).await?;
    let port = listener.local_addr()?.port();
    let state = ApiState::new(SECRET);
    tokio::spawn(burrow_api::serve(listener, state.clone()));
    Ok(Server {
        url: format!("http://127.0.0.1:{port}"),
        state,
    })
}

/// A loopback host with a fixed identity.
pub async fn host(id: &str) -> Result<Arc<TcpHost>> {
    let id: PeerId = id.parse()?;
    Ok(Arc::new(TcpHost::bind(id, "127.0.0.1:0", None).await?))
}

/// A publishing client for `host` under `fingerprint`.
pub fn client(server: &Server, fingerprint: &str, host: Arc<TcpHost>) -> Arc<RendezvousClient> {
    Arc::new(RendezvousClient::new(&server.url, SECRET, fingerprint, host))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

mod directory;
mod discovery;
mod tunnel;
