//! `burrowd peer` runs an ordinary peer. It registers, finds the relay, watches
//! reachability, and serves tunnel streams plus an optional local SOCKS5 ingress.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use burrow_client::RendezvousClient;
use burrow_core::config::{BurrowConfig, ReachabilityMode};
use burrow_core::wire::Namespace;
use burrow_services::tunnel::{serve_inbound, Dialer, Dialers, DirectDialer, OverlayDialer};
use burrow_services::{
    BufferPool, ContentRouting, FingerprintRouting, P2pHost, PeerRouting, Reachability,
    ReachabilityWatcher, Route, ServerIdentity, TcpHost, Tunnel,
};

use crate::socks;

/// How long startup waits for the relay provider list.
const RELAY_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config: BurrowConfig, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let public_ip = match config.network.public_ip.as_str() {
        "" => None,
        ip => Some(
            ip.parse::<IpAddr>()
                .with_context(|| format!("invalid network.public_ip {ip:?}"))?,
        ),
    };
    let host = Arc::new(
        TcpHost::bind(
            crate::generate_peer_id()?,
            &config.network.listen_addr,
            public_ip,
        )
        .await
        .with_context(|| format!("bind p2p host on {}", config.network.listen_addr))?,
    );

    let fingerprint = if config.rendezvous.fingerprint.is_empty() {
        hex::encode(rand::random::<[u8; 8]>())
    } else {
        config.rendezvous.fingerprint.clone()
    };
    let client = Arc::new(RendezvousClient::new(
        &config.rendezvous.server_url,
        &config.rendezvous.secret,
        &fingerprint,
        host.clone(),
    ));

    client
        .register(&config.rendezvous.namespace)
        .await
        .context("register with rendezvous server")?;
    tracing::info!(peer = %host.id(), fingerprint = %fingerprint, "registered");

    connect_server(&client, host.as_ref()).await;
    connect_relays(&client, host.as_ref()).await;

    // Subscribe only after the first connection attempts, then apply any
    // configured classification so the watcher sees it.
    let watcher = ReachabilityWatcher::new(
        client.clone(),
        Namespace::derive(&config.rendezvous.namespace),
        Duration::from_secs(config.nat.settle_secs),
    )
    .rearm(config.nat.rearm)
    .spawn(host.subscribe_reachability());
    match config.network.reachability {
        ReachabilityMode::Public => host.report_reachability(Reachability::Public),
        ReachabilityMode::Private => host.report_reachability(Reachability::Private),
        ReachabilityMode::Auto => {}
    }

    // ── Tunnel ───────────────────────────────────────────────────────────────
    let overlay: Option<Arc<dyn Dialer>> = if config.tunnel.exit_fingerprint.is_empty() {
        None
    } else {
        Some(Arc::new(OverlayDialer::new(
            host.clone(),
            client.clone(),
            client.clone(),
            config.tunnel.exit_fingerprint.clone(),
        )))
    };
    let route = if overlay.is_some() {
        Route::Overlay
    } else {
        Route::Direct
    };
    let (tunnel, mut dispatcher) = Tunnel::spawn(
        Dialers {
            direct: Arc::new(DirectDialer),
            overlay,
        },
        BufferPool::default(),
        Duration::from_secs(config.tunnel.linger_secs),
    );
    serve_inbound(host.as_ref(), tunnel.clone());

    let mut socks_task = if config.tunnel.socks_addr.is_empty() {
        None
    } else {
        let listener = TcpListener::bind(&config.tunnel.socks_addr)
            .await
            .with_context(|| format!("bind SOCKS ingress on {}", config.tunnel.socks_addr))?;
        Some(tokio::spawn(socks::serve(listener, tunnel.clone(), route)))
    };

    // ── Wait for exit ────────────────────────────────────────────────────────
    let socks_exit = async {
        match socks_task.as_mut() {
            Some(task) => task.await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = shutdown.recv() => tracing::info!("shutting down"),
        r = &mut dispatcher => tracing::error!("tunnel dispatcher exited: {:?}", r),
        r = socks_exit => tracing::error!("SOCKS ingress exited: {:?}", r),
    }

    watcher.abort();
    if let Err(e) = client.logout(&fingerprint).await {
        tracing::warn!(fingerprint = %fingerprint, error = %e, "logout failed");
    }
    Ok(())
}

/// Find the relay peer by its published id and connect so the host can start
/// classifying its own reachability.
async fn connect_server(client: &RendezvousClient, host: &dyn P2pHost) {
    let server_id = match client.server_id().await {
        Ok(Some(id)) => id,
        Ok(None) => {
            tracing::warn!("rendezvous server has no relay peer yet");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "server id lookup failed");
            return;
        }
    };
    match client.find_peer(&server_id).await {
        Ok(Some(info)) => match host.connect(&info).await {
            Ok(()) => tracing::info!(server_id = %server_id, "connected to relay peer"),
            Err(e) => tracing::warn!(server_id = %server_id, error = %e, "relay peer unreachable"),
        },
        Ok(None) => tracing::warn!(server_id = %server_id, "relay peer not in directory"),
        Err(e) => tracing::warn!(error = %e, "relay peer lookup failed"),
    }
}

/// Connect to every peer advertising relay service, giving up on the lookup
/// after `RELAY_LOOKUP_TIMEOUT`.
async fn connect_relays(client: &RendezvousClient, host: &dyn P2pHost) {
    let cancel = CancellationToken::new();
    let mut relays = client.find_providers(&Namespace::relay(), &cancel);
    let deadline = tokio::time::sleep(RELAY_LOOKUP_TIMEOUT);
    tokio::pin!(deadline);

    let mut connected = 0usize;
    loop {
        let info = tokio::select! {
            _ = &mut deadline => {
                cancel.cancel();
                tracing::warn!("relay lookup timed out");
                break;
            }
            next = relays.next_provider() => match next {
                Some(info) => info,
                None => break,
            },
        };
        if info.id == *host.id() {
            continue;
        }
        match host.connect(&info).await {
            Ok(()) => connected += 1,
            Err(e) => tracing::debug!(relay = %info.id, error = %e, "relay unreachable"),
        }
    }
    tracing::info!(connected, "relay providers connected");
}
