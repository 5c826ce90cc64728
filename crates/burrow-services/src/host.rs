//! The peer-to-peer host seam.
//!
//! Everything above the transport (rendezvous client, NAT watcher, tunnel)
//! talks to a `P2pHost`. Connection establishment, multiplexing and NAT
//! traversal live behind it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use burrow_core::addr::{AddrInfo, Multiaddr, PeerId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::broadcast;

/// Longest header or target line accepted on a fresh stream.
pub const MAX_LINE_LEN: usize = 512;

// ── Streams ───────────────────────────────────────────────────────────────────

pub trait DuplexStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DuplexStream for T {}

/// A bidirectional byte stream to a remote peer.
pub type PeerStream = Box<dyn DuplexStream>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Called once per inbound stream for a registered protocol.
pub type StreamHandler = Arc<dyn Fn(PeerId, PeerStream) -> HandlerFuture + Send + Sync>;

// ── Reachability ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Unknown,
    Public,
    Private,
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Reachability::Unknown => "unknown",
            Reachability::Public => "public",
            Reachability::Private => "private",
        })
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("no known addresses for peer {0}")]
    UnknownPeer(PeerId),
    #[error("no dialable address for peer {0}")]
    NoDialableAddr(PeerId),
    #[error("bad stream header: {0}")]
    BadHeader(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Host trait ────────────────────────────────────────────────────────────────

#[async_trait]
pub trait P2pHost: Send + Sync {
    fn id(&self) -> &PeerId;

    /// Addresses this host currently advertises.
    fn addrs(&self) -> Vec<Multiaddr>;

    /// Learn `info`'s addresses and make sure at least one is reachable.
    async fn connect(&self, info: &AddrInfo) -> Result<(), HostError>;

    async fn open_stream(&self, peer: &PeerId, protocol: &str) -> Result<PeerStream, HostError>;

    fn set_stream_handler(&self, protocol: &str, handler: StreamHandler);

    /// Reachability changes from now on. Earlier changes are not replayed.
    fn subscribe_reachability(&self) -> broadcast::Receiver<Reachability>;
}

/// Read one `\n`-terminated line without consuming anything after it.
///
/// Reads a byte at a time so the rest of the stream stays untouched for the
/// relay. Fails on EOF before the newline or past `MAX_LINE_LEN`.
pub async fn read_line<S: AsyncRead + Unpin + ?Sized>(stream: &mut S) -> Result<String, HostError> {
    let mut line = Vec::with_capacity(64);
    loop {
        let byte = stream.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        if line.len() >= MAX_LINE_LEN {
            return Err(HostError::BadHeader("line too long".into()));
        }
        line.push(byte);
    }
    let line = String::from_utf8(line).map_err(|_| HostError::BadHeader("not utf-8".into()))?;
    Ok(line.trim_end_matches('\r').to_string())
}

/// Pause before retrying `accept` after `failures` consecutive errors:
/// 10 ms doubling up to one second. Errors such as EMFILE persist until
/// something else closes a socket.
pub fn accept_backoff(failures: u32) -> Duration {
    const FIRST: Duration = Duration::from_millis(10);
    const MAX: Duration = Duration::from_secs(1);
    FIRST
        .checked_mul(1u32 << failures.saturating_sub(1).min(16))
        .map_or(MAX, |d| d.min(MAX))
}
