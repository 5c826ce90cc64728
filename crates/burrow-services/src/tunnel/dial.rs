//! Outbound legs of a tunnel pairing.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use burrow_core::wire::TUNNEL_PROTOCOL;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::host::{P2pHost, PeerStream};
use crate::routing::{FingerprintRouting, PeerRouting};

#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a stream that ends up at `target` (`host:port`).
    async fn dial(&self, target: &str) -> Result<PeerStream>;
}

/// Plain TCP to the destination.
pub struct DirectDialer;

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, target: &str) -> Result<PeerStream> {
        let stream = TcpStream::connect(target)
            .await
            .with_context(|| format!("dial {target}"))?;
        let _ = stream.set_nodelay(true);
        Ok(Box::new(stream))
    }
}

/// Through the overlay: a tunnel stream to the peer currently registered
/// under `exit_fingerprint`, which dials `target` on our behalf.
pub struct OverlayDialer {
    host: Arc<dyn P2pHost>,
    peers: Arc<dyn PeerRouting>,
    fingerprints: Arc<dyn FingerprintRouting>,
    exit_fingerprint: String,
}

impl OverlayDialer {
    pub fn new(
        host: Arc<dyn P2pHost>,
        peers: Arc<dyn PeerRouting>,
        fingerprints: Arc<dyn FingerprintRouting>,
        exit_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            host,
            peers,
            fingerprints,
            exit_fingerprint: exit_fingerprint.into(),
        }
    }
}

#[async_trait]
impl Dialer for OverlayDialer {
    async fn dial(&self, target: &str) -> Result<PeerStream> {
        let exit = self
            .fingerprints
            .find_peer_id(&self.exit_fingerprint)
            .await?
            .ok_or_else(|| anyhow!("no peer registered for fingerprint {}", self.exit_fingerprint))?;

        let info = self
            .peers
            .find_peer(&exit)
            .await?
            .ok_or_else(|| anyhow!("exit peer {exit} not in directory"))?;
        self.host
            .connect(&info)
            .await
            .with_context(|| format!("connect to exit peer {exit}"))?;

        let mut stream = self
            .host
            .open_stream(&exit, TUNNEL_PROTOCOL)
            .await
            .with_context(|| format!("open tunnel stream to {exit}"))?;
        stream.write_all(format!("{target}\n").as_bytes()).await?;

        tracing::debug!(peer = %exit, dest = target, "overlay stream opened");
        Ok(stream)
    }
}
