//! Public address discovery.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const LOOKUP_URL: &str = "https://api-ipv4.ip.sb/ip";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Ask an external echo service for our public IPv4 address.
/// Falls back to 127.0.0.1 when the lookup fails.
pub async fn public_ip() -> IpAddr {
    match fetch_public_ip(LOOKUP_URL).await {
        Ok(ip) => ip,
        Err(e) => {
            tracing::warn!(error = %e, "public ip lookup failed, using 127.0.0.1");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

async fn fetch_public_ip(url: &str) -> Result<IpAddr, Box<dyn std::error::Error + Send + Sync>> {
    let text = reqwest::Client::new()
        .get(url)
        .timeout(LOOKUP_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(text.trim().parse()?)
}
