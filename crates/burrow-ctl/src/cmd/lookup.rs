//! Directory lookups: peers, provider groups, the relay peer id.

use anyhow::{Context, Result};

use burrow_client::RendezvousClient;
use burrow_core::addr::{AddrInfo, PeerId};
use burrow_core::wire::Namespace;
use burrow_services::{PeerRouting, ServerIdentity};

fn print_info(info: &AddrInfo) {
    println!("  ┌─ {}", info.id);
    if info.addrs.is_empty() {
        println!("  └─ (no addresses)");
        return;
    }
    let last = info.addrs.len() - 1;
    for (i, addr) in info.addrs.iter().enumerate() {
        let branch = if i == last { "└─" } else { "│ " };
        println!("  {branch} {addr}");
    }
}

pub async fn cmd_peer(client: &RendezvousClient, id: &str) -> Result<()> {
    let id: PeerId = id.parse().context("invalid peer id")?;
    match client.find_peer(&id).await? {
        Some(info) => print_info(&info),
        None => println!("Peer {id} is not registered."),
    }
    Ok(())
}

/// `name` is the human group name; the namespace key is derived from it
/// the same way peers derive it when they register.
pub async fn cmd_providers(client: &RendezvousClient, name: &str) -> Result<()> {
    let namespace = if name == "relay" {
        Namespace::relay()
    } else {
        Namespace::derive(name)
    };
    let providers = client.providers(&namespace).await?;
    if providers.is_empty() {
        println!("No providers under {name:?} ({namespace}).");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Providers of {name:?} ({})", providers.len());
    println!("═══════════════════════════════════════");
    for info in &providers {
        print_info(info);
    }
    Ok(())
}

pub async fn cmd_server_id(client: &RendezvousClient) -> Result<()> {
    match client.server_id().await? {
        Some(id) => println!("{id}"),
        None => println!("No relay peer has published its id yet."),
    }
    Ok(())
}
