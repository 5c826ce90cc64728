//! Routing capabilities a peer needs from the rendezvous service.
//!
//! Kept as separate traits so each can be faked on its own; the rendezvous
//! client implements all four.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use burrow_core::addr::{AddrInfo, PeerId};
use burrow_core::wire::Namespace;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFutureOwned};

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("rendezvous request failed: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("malformed rendezvous response: {0}")]
    Decode(String),
    #[error("{0}")]
    Rejected(&'static str),
}

impl RouteError {
    pub fn http(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Http(Box::new(e))
    }
}

// ── Capabilities ──────────────────────────────────────────────────────────────

#[async_trait]
pub trait PeerRouting: Send + Sync {
    /// `None` when the directory does not know the peer.
    async fn find_peer(&self, id: &PeerId) -> Result<Option<AddrInfo>, RouteError>;
}

#[async_trait]
pub trait ContentRouting: Send + Sync {
    /// Publish this peer's addresses under `namespace`. No-op unless `bcast`.
    async fn provide(&self, namespace: &Namespace, bcast: bool) -> Result<(), RouteError>;

    /// Everyone providing `namespace`, delivered lazily until `cancel` fires.
    fn find_providers(&self, namespace: &Namespace, cancel: &CancellationToken) -> ProviderStream;
}

#[async_trait]
pub trait FingerprintRouting: Send + Sync {
    async fn find_peer_id(&self, fingerprint: &str) -> Result<Option<PeerId>, RouteError>;

    /// Remove the fingerprint mapping on the server.
    async fn logout(&self, fingerprint: &str) -> Result<(), RouteError>;
}

#[async_trait]
pub trait ServerIdentity: Send + Sync {
    async fn server_id(&self) -> Result<Option<PeerId>, RouteError>;

    /// Publish this host's identity as the relay peer.
    async fn set_server_id(&self) -> Result<(), RouteError>;
}

// ── Provider stream ───────────────────────────────────────────────────────────

/// Create a provider stream and the sink a producer task feeds it through.
///
/// The stream ends when the producer finishes, when `cancel` fires, or when
/// the stream is dropped (which cancels only this lookup).
pub fn provider_channel(
    capacity: usize,
    cancel: &CancellationToken,
) -> (ProviderSink, ProviderStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let token = cancel.child_token();
    let sink = ProviderSink {
        tx,
        cancel: token.clone(),
    };
    let stream = ProviderStream {
        rx,
        cancel: token.clone(),
        cancelled: Box::pin(token.clone().cancelled_owned()),
        _guard: token.drop_guard(),
    };
    (sink, stream)
}

pub struct ProviderSink {
    tx: mpsc::Sender<AddrInfo>,
    cancel: CancellationToken,
}

impl ProviderSink {
    /// Deliver one entry. Returns `false` once the lookup is cancelled or the
    /// consumer is gone; the producer should stop then.
    pub async fn send(&self, info: AddrInfo) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(info) => sent.is_ok(),
        }
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Finite, non-restartable sequence of provider entries.
pub struct ProviderStream {
    rx: mpsc::Receiver<AddrInfo>,
    cancel: CancellationToken,
    /// Registers the `Stream` consumer's waker with the token.
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    _guard: DropGuard,
}

impl ProviderStream {
    pub async fn next_provider(&mut self) -> Option<AddrInfo> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }
}

impl Stream for ProviderStream {
    type Item = AddrInfo;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<AddrInfo>> {
        if self.cancel.is_cancelled() || self.cancelled.as_mut().poll(cx).is_ready() {
            self.rx.close();
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}
