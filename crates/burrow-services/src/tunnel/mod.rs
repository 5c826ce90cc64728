//! Tunnel relay engine.
//!
//! Ingress (the SOCKS listener, or inbound overlay streams) hands
//! `ConnContext`s to a `Tunnel`. A single dispatcher drains the hand-off
//! queue and spawns one worker per pairing: dial the target, relay bytes both
//! ways, tear down. Pairings are independent of one another once dispatched.

mod dial;
mod inbound;
mod relay;

pub use dial::{Dialer, DirectDialer, OverlayDialer};
pub use inbound::serve_inbound;
pub use relay::{relay, RelayStats};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::host::PeerStream;
use crate::pool::BufferPool;

/// How the far leg of a pairing is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Dial the target over plain TCP from this process.
    Direct,
    /// Ask the exit peer to dial it.
    Overlay,
}

/// One accepted connection waiting to be paired with its target.
pub struct ConnContext {
    /// `host:port`.
    pub target: String,
    pub route: Route,
    pub conn: PeerStream,
}

impl ConnContext {
    pub fn new(target: impl Into<String>, route: Route, conn: PeerStream) -> Self {
        Self {
            target: target.into(),
            route,
            conn,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("tunnel dispatcher has stopped")]
pub struct TunnelClosed;

#[derive(Clone)]
pub struct Dialers {
    pub direct: Arc<dyn Dialer>,
    pub overlay: Option<Arc<dyn Dialer>>,
}

impl Dialers {
    pub fn direct_only() -> Self {
        Self {
            direct: Arc::new(DirectDialer),
            overlay: None,
        }
    }
}

/// Producer handle for the hand-off queue. Cheap to clone.
#[derive(Clone)]
pub struct Tunnel {
    tx: mpsc::Sender<ConnContext>,
}

impl Tunnel {
    /// Start the dispatcher. It runs until every `Tunnel` handle is dropped.
    pub fn spawn(dialers: Dialers, pool: BufferPool, linger: Duration) -> (Self, JoinHandle<()>) {
        // Capacity one: a producer waits until the dispatcher has taken the
        // previous entry.
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(dispatch(rx, dialers, pool, linger));
        (Self { tx }, handle)
    }

    pub async fn enqueue(&self, ctx: ConnContext) -> Result<(), TunnelClosed> {
        self.tx.send(ctx).await.map_err(|_| TunnelClosed)
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<ConnContext>,
    dialers: Dialers,
    pool: BufferPool,
    linger: Duration,
) {
    while let Some(ctx) = rx.recv().await {
        tokio::spawn(handle_conn(ctx, dialers.clone(), pool.clone(), linger));
    }
    tracing::debug!("tunnel dispatcher stopped");
}

async fn handle_conn(ctx: ConnContext, dialers: Dialers, pool: BufferPool, linger: Duration) {
    let ConnContext {
        target,
        route,
        conn,
    } = ctx;

    let dialer = match route {
        Route::Direct => dialers.direct,
        Route::Overlay => match dialers.overlay {
            Some(d) => d,
            None => {
                tracing::warn!(dest = %target, "overlay route requested but no exit configured");
                return;
            }
        },
    };

    let remote = match dialer.dial(&target).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(dest = %target, ?route, error = %e, "tunnel dial failed");
            return;
        }
    };

    let stats = relay(conn, remote, &pool, linger).await;
    tracing::debug!(
        dest = %target,
        up = stats.up,
        down = stats.down,
        lingered_out = stats.lingered_out,
        "tunnel pairing closed"
    );
}
