//! Exit side of the overlay: accept tunnel streams from other peers.

use std::sync::Arc;

use burrow_core::addr::PeerId;
use burrow_core::wire::TUNNEL_PROTOCOL;

use super::{ConnContext, Route, Tunnel};
use crate::host::{read_line, HandlerFuture, P2pHost, PeerStream};

/// Register the tunnel protocol on `host`. Each inbound stream starts with a
/// `host:port\n` line naming the destination; the rest is payload, handed to
/// `tunnel` to be dialed directly from here.
pub fn serve_inbound(host: &dyn P2pHost, tunnel: Tunnel) {
    host.set_stream_handler(
        TUNNEL_PROTOCOL,
        Arc::new(move |from: PeerId, stream: PeerStream| -> HandlerFuture {
            let tunnel = tunnel.clone();
            Box::pin(accept(from, stream, tunnel))
        }),
    );
}

async fn accept(from: PeerId, mut stream: PeerStream, tunnel: Tunnel) {
    let target = match read_line(&mut stream).await {
        Ok(t) if !t.is_empty() => t,
        Ok(_) => {
            tracing::warn!(peer = %from, "tunnel stream with empty target");
            return;
        }
        Err(e) => {
            tracing::warn!(peer = %from, error = %e, "bad tunnel stream");
            return;
        }
    };

    tracing::debug!(peer = %from, dest = %target, "inbound tunnel stream");
    if let Err(e) = tunnel
        .enqueue(ConnContext::new(target, Route::Direct, stream))
        .await
    {
        tracing::warn!(peer = %from, error = %e, "dropping inbound tunnel stream");
    }
}
