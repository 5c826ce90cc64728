//! Minimal SOCKS5 ingress (RFC 1928): no authentication, CONNECT only,
//! IPv4 / domain / IPv6 targets. The destination is handed to the tunnel.

use std::net::{Ipv4Addr, Ipv6Addr};

use anyhow::{bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

use burrow_services::{accept_backoff, ConnContext, Route, Tunnel};

const VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;
const NO_ACCEPTABLE_METHOD: u8 = 0xff;
const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REP_SUCCEEDED: u8 = 0x00;
const REP_COMMAND_NOT_SUPPORTED: u8 = 0x07;
const REP_ATYP_NOT_SUPPORTED: u8 = 0x08;

pub async fn serve(listener: TcpListener, tunnel: Tunnel, route: Route) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, ?route, "SOCKS proxy listening");
    let mut failures = 0u32;
    loop {
        let (mut conn, peer) = match listener.accept().await {
            Ok(pair) => {
                failures = 0;
                pair
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                tracing::warn!(error = %e, failures, "SOCKS accept error");
                tokio::time::sleep(accept_backoff(failures)).await;
                continue;
            }
        };
        let tunnel = tunnel.clone();
        tokio::spawn(async move {
            let target = match handshake(&mut conn).await {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!(%peer, error = %e, "SOCKS handshake failed");
                    return;
                }
            };
            let _ = conn.set_nodelay(true);
            if tunnel
                .enqueue(ConnContext::new(target, route, Box::new(conn)))
                .await
                .is_err()
            {
                tracing::warn!(%peer, "tunnel closed, dropping SOCKS connection");
            }
        });
    }
}

/// Run the server side of the handshake and return `host:port`.
///
/// Success is reported to the client as soon as the request parses; a later
/// dial failure shows up as the connection closing.
pub async fn handshake<S>(stream: &mut S) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // VER, NMETHODS, METHODS...
    let ver = stream.read_u8().await?;
    if ver != VERSION {
        bail!("unsupported SOCKS version {ver}");
    }
    let nmethods = stream.read_u8().await? as usize;
    let mut methods = vec![0u8; nmethods];
    stream.read_exact(&mut methods).await?;
    if !methods.contains(&NO_AUTH) {
        stream.write_all(&[VERSION, NO_ACCEPTABLE_METHOD]).await?;
        bail!("client offers no unauthenticated method");
    }
    stream.write_all(&[VERSION, NO_AUTH]).await?;

    // VER, CMD, RSV, ATYP, DST.ADDR, DST.PORT
    let ver = stream.read_u8().await?;
    if ver != VERSION {
        bail!("bad request version {ver}");
    }
    let cmd = stream.read_u8().await?;
    let _rsv = stream.read_u8().await?;
    let atyp = stream.read_u8().await?;

    if cmd != CMD_CONNECT {
        reply(stream, REP_COMMAND_NOT_SUPPORTED).await?;
        bail!("unsupported command {cmd}");
    }

    let target = match atyp {
        ATYP_IPV4 => {
            let mut ip = [0u8; 4];
            stream.read_exact(&mut ip).await?;
            let port = stream.read_u16().await?;
            format!("{}:{port}", Ipv4Addr::from(ip))
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            let mut name = vec![0u8; len];
            stream.read_exact(&mut name).await?;
            let port = stream.read_u16().await?;
            format!("{}:{port}", String::from_utf8_lossy(&name))
        }
        ATYP_IPV6 => {
            let mut ip = [0u8; 16];
            stream.read_exact(&mut ip).await?;
            let port = stream.read_u16().await?;
            format!("[{}]:{port}", Ipv6Addr::from(ip))
        }
        other => {
            reply(stream, REP_ATYP_NOT_SUPPORTED).await?;
            bail!("unsupported address type {other}");
        }
    };

    reply(stream, REP_SUCCEEDED).await?;
    Ok(target)
}

async fn reply<S: AsyncWrite + Unpin>(stream: &mut S, rep: u8) -> Result<()> {
    // VER, REP, RSV, ATYP=IPv4, BND.ADDR=0.0.0.0, BND.PORT=0
    stream
        .write_all(&[VERSION, rep, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
        .await?;
    Ok(())
}
