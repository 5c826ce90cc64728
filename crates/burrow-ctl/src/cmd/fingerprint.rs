//! Fingerprint resolution and logout.

use anyhow::Result;

use burrow_client::RendezvousClient;
use burrow_services::FingerprintRouting;

pub async fn cmd_fingerprint(client: &RendezvousClient, fingerprint: &str) -> Result<()> {
    match client.find_peer_id(fingerprint).await? {
        Some(id) => println!("{fingerprint} → {id}"),
        None => println!("Fingerprint {fingerprint} is not registered."),
    }
    Ok(())
}

pub async fn cmd_logout(client: &RendezvousClient, fingerprint: &str) -> Result<()> {
    client.logout(fingerprint).await?;
    println!("Logged out {fingerprint}.");
    Ok(())
}
