//! A `P2pHost` over plain TCP.
//!
//! Every stream is its own TCP connection opened with a one-line header
//! `<protocol> <peer-id>\n`. There is no multiplexing, hole punching or
//! circuit relaying here; reachability is whatever gets reported to it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use burrow_core::addr::{tcp_addr, AddrInfo, Multiaddr, MultiaddrExt, PeerId};
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use crate::host::{
    accept_backoff, read_line, HostError, P2pHost, PeerStream, Reachability, StreamHandler,
};

struct Inner {
    id: PeerId,
    local_addr: SocketAddr,
    advertised: Vec<Multiaddr>,
    /// Peer store filled by `connect`.
    peers: DashMap<PeerId, Vec<Multiaddr>>,
    handlers: DashMap<String, StreamHandler>,
    reachability: Mutex<Reachability>,
    reachability_tx: broadcast::Sender<Reachability>,
}

#[derive(Clone)]
pub struct TcpHost {
    inner: Arc<Inner>,
}

impl TcpHost {
    /// Bind `listen_addr` and start accepting streams.
    ///
    /// Unspecified or loopback binds advertise `public_ip` when given, else
    /// `127.0.0.1` (which the rendezvous server rewrites to the address it
    /// sees the registration come from).
    pub async fn bind(
        id: PeerId,
        listen_addr: &str,
        public_ip: Option<IpAddr>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(listen_addr).await?;
        let local_addr = listener.local_addr()?;

        let bound = local_addr.ip();
        let ip = if bound.is_unspecified() || bound.is_loopback() {
            public_ip.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
        } else {
            bound
        };
        let advertised = vec![tcp_addr(ip, local_addr.port())];

        let (reachability_tx, _) = broadcast::channel(16);
        let host = Self {
            inner: Arc::new(Inner {
                id,
                local_addr,
                advertised,
                peers: DashMap::new(),
                handlers: DashMap::new(),
                reachability: Mutex::new(Reachability::Unknown),
                reachability_tx,
            }),
        };

        tracing::info!(
            peer = %host.inner.id,
            %local_addr,
            addrs = ?host.inner.advertised.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "p2p host listening"
        );
        tokio::spawn(accept_loop(listener, host.inner.clone()));
        Ok(host)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn reachability(&self) -> Reachability {
        *self
            .inner
            .reachability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new classification. Subscribers hear only actual changes.
    pub fn report_reachability(&self, next: Reachability) {
        let mut current = self
            .inner
            .reachability
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *current == next {
            return;
        }
        *current = next;
        tracing::info!(reachability = %next, "reachability changed");
        let _ = self.inner.reachability_tx.send(next);
    }
}

#[async_trait]
impl P2pHost for TcpHost {
    fn id(&self) -> &PeerId {
        &self.inner.id
    }

    fn addrs(&self) -> Vec<Multiaddr> {
        self.inner.advertised.clone()
    }

    async fn connect(&self, info: &AddrInfo) -> Result<(), HostError> {
        if info.id == self.inner.id {
            return Ok(());
        }
        let dialable: Vec<Multiaddr> = info
            .addrs
            .iter()
            .filter(|a| a.tcp_socket_addr().is_some())
            .cloned()
            .collect();
        if dialable.is_empty() {
            return Err(HostError::NoDialableAddr(info.id.clone()));
        }

        // A bare connection that closes before any header is a health check.
        dial_any(&info.id, &dialable).await?;
        self.inner.peers.insert(info.id.clone(), dialable);
        tracing::debug!(peer = %info.id, "connected");
        Ok(())
    }

    async fn open_stream(&self, peer: &PeerId, protocol: &str) -> Result<PeerStream, HostError> {
        let addrs = self
            .inner
            .peers
            .get(peer)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| HostError::UnknownPeer(peer.clone()))?;

        let mut stream = dial_any(peer, &addrs).await?;
        let header = format!("{protocol} {}\n", self.inner.id);
        stream.write_all(header.as_bytes()).await?;
        Ok(Box::new(stream))
    }

    fn set_stream_handler(&self, protocol: &str, handler: StreamHandler) {
        self.inner.handlers.insert(protocol.to_string(), handler);
    }

    fn subscribe_reachability(&self) -> broadcast::Receiver<Reachability> {
        self.inner.reachability_tx.subscribe()
    }
}

async fn dial_any(peer: &PeerId, addrs: &[Multiaddr]) -> Result<TcpStream, HostError> {
    let mut last_err = None;
    for addr in addrs {
        let Some(target) = addr.tcp_socket_addr() else {
            continue;
        };
        match TcpStream::connect(&target).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(peer = %peer, %target, error = %e, "dial failed");
                last_err = Some(e);
            }
        }
    }
    Err(match last_err {
        Some(e) => HostError::Io(e),
        None => HostError::NoDialableAddr(peer.clone()),
    })
}

// ── Inbound ───────────────────────────────────────────────────────────────────

async fn accept_loop(listener: TcpListener, inner: Arc<Inner>) {
    let mut failures = 0u32;
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => {
                failures = 0;
                pair
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                tracing::warn!(error = %e, failures, "p2p accept failed");
                tokio::time::sleep(accept_backoff(failures)).await;
                continue;
            }
        };
        let inner = inner.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatch_inbound(stream, &inner).await {
                tracing::debug!(%remote, error = %e, "inbound stream dropped");
            }
        });
    }
}

async fn dispatch_inbound(mut stream: TcpStream, inner: &Inner) -> Result<(), HostError> {
    let header = read_line(&mut stream).await?;
    let (protocol, remote_id) = header
        .split_once(' ')
        .ok_or_else(|| HostError::BadHeader(header.clone()))?;
    let remote_id: PeerId = remote_id
        .parse()
        .map_err(|_| HostError::BadHeader(header.clone()))?;

    let handler = inner
        .handlers
        .get(protocol)
        .map(|h| h.value().clone())
        .ok_or_else(|| HostError::BadHeader(format!("no handler for {protocol}")))?;

    tracing::debug!(peer = %remote_id, protocol, "inbound stream");
    handler(remote_id, Box::new(stream)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HandlerFuture;
    use tokio::io::AsyncReadExt;

    fn peer(s: &str) -> PeerId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn streams_reach_registered_handler() {
        let a = TcpHost::bind(peer("QmA"), "127.0.0.1:0", None).await.unwrap();
        let b = TcpHost::bind(peer("QmB"), "127.0.0.1:0", None).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        b.set_stream_handler(
            "/echo",
            Arc::new(move |from: PeerId, mut stream: PeerStream| -> HandlerFuture {
                let tx = tx.clone();
                Box::pin(async move {
                    let mut buf = String::new();
                    stream.read_to_string(&mut buf).await.unwrap();
                    tx.send((from, buf)).await.unwrap();
                })
            }),
        );

        a.connect(&AddrInfo::new(b.id().clone(), b.addrs())).await.unwrap();
        let mut stream = a.open_stream(b.id(), "/echo").await.unwrap();
        stream.write_all(b"hello").await.unwrap();
        stream.shutdown().await.unwrap();

        let (from, body) = rx.recv().await.unwrap();
        assert_eq!(from, peer("QmA"));
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn open_stream_to_unknown_peer_fails() {
        let a = TcpHost::bind(peer("QmA"), "127.0.0.1:0", None).await.unwrap();
        assert!(matches!(
            a.open_stream(&peer("QmGhost"), "/x").await,
            Err(HostError::UnknownPeer(_))
        ));
    }

    #[tokio::test]
    async fn advertises_public_ip_for_loopback_bind() {
        let ip: IpAddr = "198.51.100.7".parse().unwrap();
        let host = TcpHost::bind(peer("QmS"), "127.0.0.1:0", Some(ip)).await.unwrap();
        let port = host.local_addr().port();
        assert_eq!(
            host.addrs()[0].to_string(),
            format!("/ip4/198.51.100.7/tcp/{port}")
        );
    }

    #[tokio::test]
    async fn reachability_reports_only_changes() {
        let host = TcpHost::bind(peer("QmA"), "127.0.0.1:0", None).await.unwrap();
        let mut rx = host.subscribe_reachability();
        host.report_reachability(Reachability::Private);
        host.report_reachability(Reachability::Private);
        host.report_reachability(Reachability::Public);

        assert_eq!(rx.recv().await.unwrap(), Reachability::Private);
        assert_eq!(rx.recv().await.unwrap(), Reachability::Public);
        assert!(rx.try_recv().is_err());
        assert_eq!(host.reachability(), Reachability::Public);
    }
}
