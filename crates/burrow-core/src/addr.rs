//! Peer identities and transport addresses.
//!
//! Addresses are standard multiaddrs (`/ip4/203.0.113.5/tcp/4001/p2p/<id>`)
//! from the `multiaddr` crate, so any address a libp2p peer advertises is
//! accepted. `MultiaddrExt` adds the few questions the registry and the
//! tunnel ask of them.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

pub use multiaddr::{Multiaddr, Protocol};

/// Longest peer identity string we accept.
const MAX_PEER_ID_LEN: usize = 128;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddrError {
    #[error("invalid multiaddr {addr:?}: {reason}")]
    Invalid { addr: String, reason: String },
    #[error("invalid peer id {0:?}")]
    InvalidPeerId(String),
}

// ── Peer identity ─────────────────────────────────────────────────────────────

/// Opaque, globally unique peer identity.
///
/// Generated outside this system from a keypair. We only check that it is a
/// plausible token (ASCII alphanumeric, bounded length) so it can be used
/// safely as a URL path segment and map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId(String);

impl PeerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PeerId {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.len() <= MAX_PEER_ID_LEN
            && s.bytes().all(|b| b.is_ascii_alphanumeric());
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(AddrError::InvalidPeerId(s.to_string()))
        }
    }
}

impl TryFrom<String> for PeerId {
    type Error = AddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Multiaddr helpers ─────────────────────────────────────────────────────────

/// `/ip4/<ip>/tcp/<port>` or `/ip6/<ip>/tcp/<port>`.
pub fn tcp_addr(ip: IpAddr, port: u16) -> Multiaddr {
    Multiaddr::from(ip).with(Protocol::Tcp(port))
}

pub trait MultiaddrExt {
    /// First literal IP component.
    fn ip(&self) -> Option<IpAddr>;

    fn is_relayed(&self) -> bool;

    /// Dialable `host:port` for a plain TCP address. `None` for relayed,
    /// UDP-only or host-less addresses.
    fn tcp_socket_addr(&self) -> Option<String>;

    fn is_loopback(&self) -> bool;

    /// Whether the address is reachable from the public internet.
    /// DNS names count as public unless they name localhost.
    fn is_public(&self) -> bool;
}

impl MultiaddrExt for Multiaddr {
    fn ip(&self) -> Option<IpAddr> {
        self.iter().find_map(|p| match p {
            Protocol::Ip4(v4) => Some(IpAddr::V4(v4)),
            Protocol::Ip6(v6) => Some(IpAddr::V6(v6)),
            _ => None,
        })
    }

    fn is_relayed(&self) -> bool {
        self.iter().any(|p| matches!(p, Protocol::P2pCircuit))
    }

    fn tcp_socket_addr(&self) -> Option<String> {
        if self.is_relayed() {
            return None;
        }
        let protocols: Vec<Protocol<'_>> = self.iter().collect();
        protocols.windows(2).find_map(|pair| {
            let Protocol::Tcp(port) = &pair[1] else {
                return None;
            };
            match &pair[0] {
                Protocol::Ip4(ip) => Some(format!("{ip}:{port}")),
                Protocol::Ip6(ip) => Some(format!("[{ip}]:{port}")),
                Protocol::Dns(h) | Protocol::Dns4(h) | Protocol::Dns6(h) => {
                    Some(format!("{h}:{port}"))
                }
                _ => None,
            }
        })
    }

    fn is_loopback(&self) -> bool {
        self.ip().map(|ip| ip.is_loopback()).unwrap_or(false)
    }

    fn is_public(&self) -> bool {
        match self.iter().next() {
            Some(Protocol::Ip4(ip)) => is_public_v4(&ip),
            Some(Protocol::Ip6(ip)) => is_public_v6(&ip),
            Some(Protocol::Dns(h))
            | Some(Protocol::Dns4(h))
            | Some(Protocol::Dns6(h))
            | Some(Protocol::Dnsaddr(h)) => h != "localhost",
            _ => false,
        }
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64))
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(&v4);
    }
    let first = ip.segments()[0];
    !(ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80)
}

// ── AddrInfo ──────────────────────────────────────────────────────────────────

/// A peer identity together with its current address set.
///
/// Field names match the JSON contract existing clients speak
/// (`{"ID": "...", "Addrs": [...]}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrInfo {
    #[serde(rename = "ID")]
    pub id: PeerId,
    #[serde(rename = "Addrs", default, deserialize_with = "null_as_empty")]
    pub addrs: Vec<Multiaddr>,
}

impl AddrInfo {
    pub fn new(id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { id, addrs }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Multiaddr>, D::Error> {
    Ok(Option::<Vec<Multiaddr>>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Address lists ─────────────────────────────────────────────────────────────

/// Parse a comma-joined address list. Empty segments are skipped; the first
/// malformed segment fails the whole list.
pub fn parse_addr_list(raw: &str) -> Result<Vec<Multiaddr>, AddrError> {
    raw.split(',')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment.parse().map_err(|e: multiaddr::Error| AddrError::Invalid {
                addr: segment.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Join addresses into the comma-separated form `parse_addr_list` accepts.
pub fn join_addr_list(addrs: &[Multiaddr]) -> String {
    addrs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Replace every `/ip4/127.0.0.1` component in a raw address list with the
/// requester's observed host. A loopback requester leaves the list unchanged.
///
/// Works on the raw text so that a malformed list is still rejected later by
/// `parse_addr_list` exactly as submitted.
pub fn rewrite_loopback(raw: &str, observed: IpAddr) -> String {
    let observed = match observed {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(observed),
        v4 => v4,
    };
    if observed.is_loopback() {
        return raw.to_string();
    }
    let (proto, host) = match observed {
        IpAddr::V4(v4) => ("ip4", v4.to_string()),
        IpAddr::V6(v6) => ("ip6", v6.to_string()),
    };

    raw.split(',')
        .map(|segment| {
            let tokens: Vec<&str> = segment.split('/').collect();
            let mut out: Vec<&str> = Vec::with_capacity(tokens.len());
            let mut i = 0;
            while i < tokens.len() {
                if tokens[i] == "ip4" && tokens.get(i + 1) == Some(&"127.0.0.1") {
                    out.push(proto);
                    out.push(&host);
                    i += 2;
                } else {
                    out.push(tokens[i]);
                    i += 1;
                }
            }
            out.join("/")
        })
        .collect::<Vec<_>>()
        .join(",")
}
