//! `burrowd server`: rendezvous API plus the well-known relay peer.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use burrow_api::ApiState;
use burrow_client::RendezvousClient;
use burrow_core::config::BurrowConfig;
use burrow_core::wire::Namespace;
use burrow_services::tunnel::{serve_inbound, Dialers};
use burrow_services::{
    BufferPool, ContentRouting, P2pHost, Reachability, ServerIdentity, TcpHost, Tunnel,
};

pub async fn run(config: BurrowConfig, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    // A port we cannot bind is fatal.
    let listener = burrow_api::bind(config.server.api_port).await?;
    let api_port = listener.local_addr()?.port();
    let state = ApiState::new(&config.rendezvous.secret);
    let mut api_task = tokio::spawn(burrow_api::serve(listener, state));

    let public_ip = resolve_public_ip(&config.network.public_ip).await?;
    tracing::info!(%public_ip, "advertising relay on public address");

    let host = Arc::new(
        TcpHost::bind(
            crate::generate_peer_id()?,
            &config.network.listen_addr,
            Some(public_ip),
        )
        .await
        .with_context(|| format!("bind relay host on {}", config.network.listen_addr))?,
    );
    host.report_reachability(Reachability::Public);

    // The relay registers through its own API like any other peer.
    let client = RendezvousClient::new(
        &format!("http://127.0.0.1:{api_port}"),
        &config.rendezvous.secret,
        "",
        host.clone(),
    );
    client
        .set_server_id()
        .await
        .context("publish server id")?;
    client
        .provide(&Namespace::relay(), true)
        .await
        .context("advertise relay")?;
    tracing::info!(server_id = %host.id(), "relay peer registered");

    let (tunnel, mut dispatcher) = Tunnel::spawn(
        Dialers::direct_only(),
        BufferPool::default(),
        Duration::from_secs(config.tunnel.linger_secs),
    );
    serve_inbound(host.as_ref(), tunnel);

    // ── Wait for exit ────────────────────────────────────────────────────────
    tokio::select! {
        _ = shutdown.recv() => tracing::info!("shutting down"),
        r = &mut api_task => tracing::error!("rendezvous API exited: {:?}", r),
        r = &mut dispatcher => tracing::error!("tunnel dispatcher exited: {:?}", r),
    }
    Ok(())
}

/// Configured address, else whatever the external lookup reports.
async fn resolve_public_ip(configured: &str) -> Result<IpAddr> {
    if configured.is_empty() {
        return Ok(burrow_client::public_ip().await);
    }
    configured
        .parse()
        .with_context(|| format!("invalid network.public_ip {configured:?}"))
}
