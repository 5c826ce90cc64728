//! burrowd: rendezvous server, relay peer and tunnel endpoint.
//!
//!   burrowd server   run the rendezvous API plus the relay peer
//!   burrowd peer     run an ordinary peer (default)

use anyhow::{bail, Context, Result};

use burrow_core::addr::PeerId;
use burrow_core::config::BurrowConfig;

mod peer;
mod server;
mod socks;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "peer".to_string());
    if mode == "help" || mode == "--help" || mode == "-h" {
        print_usage();
        return Ok(());
    }

    // Load config
    if let Err(e) = BurrowConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = BurrowConfig::load().context("failed to load config")?;
    config.validate()?;
    tracing::info!(
        mode = %mode,
        server_url = %config.rendezvous.server_url,
        path = %BurrowConfig::file_path().display(),
        "burrowd starting"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let shutdown_rx = shutdown_tx.subscribe();
    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    match mode.as_str() {
        "server" => server::run(config, shutdown_rx).await,
        "peer" => peer::run(config, shutdown_rx).await,
        other => {
            print_usage();
            bail!("unknown mode {other:?}")
        }
    }
}

/// Fresh identity for this process. Identities are not persisted.
pub(crate) fn generate_peer_id() -> Result<PeerId> {
    let bytes: [u8; 16] = rand::random();
    format!("Bw{}", hex::encode(bytes))
        .parse()
        .context("generated peer id is invalid")
}

fn print_usage() {
    eprintln!("usage: burrowd [server|peer]");
    eprintln!();
    eprintln!("configuration: $BURROW_CONFIG, else ~/.config/burrow/config.toml");
    eprintln!("overrides:     BURROW_<SECTION>__<FIELD>, e.g. BURROW_TUNNEL__SOCKS_ADDR=127.0.0.1:1080");
}
