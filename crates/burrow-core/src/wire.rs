//! Rendezvous wire contract: namespaces, route paths, JSON envelopes and the
//! shared-secret credential.
//!
//! Field names in the envelopes are fixed by existing clients; absent payload
//! fields are omitted rather than serialized as `null`.

use std::collections::HashMap;
use std::fmt;

use data_encoding::BASE32_NOPAD;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::addr::{AddrInfo, PeerId};

// ── Route paths ───────────────────────────────────────────────────────────────

pub const ROUTE_PREFIX: &str = "/route/";
pub const PROVIDERS_PREFIX: &str = "/route/providers/";
pub const FINGERPRINTS_PREFIX: &str = "/route/fingerprints/";
pub const SERVER_ID_PATH: &str = "/route/server-id";

/// Request header carrying `auth_digest(secret)`.
pub const AUTH_HEADER: &str = "auth";

/// Secret used when none is configured. Deployments are expected to override it.
pub const DEFAULT_SECRET: &str = "burrow-rendezvous";

/// Stream protocol tag for tunnel streams between peers.
pub const TUNNEL_PROTOCOL: &str = "/burrow/tunnel/1.0.0";

/// Lowercase hex MD5 of the shared secret, the header value existing
/// clients send.
pub fn auth_digest(secret: &str) -> String {
    hex::encode(Md5::digest(secret.as_bytes()))
}

// ── Namespaces ────────────────────────────────────────────────────────────────

/// Name relay peers advertise under.
pub const RELAY_RENDEZVOUS: &str = "/libp2p/relay";

/// Name ordinary peers advertise under unless configured otherwise.
pub const PEER_RENDEZVOUS: &str = "clients";

/// CIDv1 prefix: version 1, `raw` codec, sha2-256 multihash of 32 bytes.
const CID_V1_RAW_SHA256: [u8; 4] = [0x01, 0x55, 0x12, 0x20];

/// Hash-derived provider group key: the base32 CIDv1 (`b...`) of the
/// SHA2-256 of the group name, so keys agree with content-routing peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Derive the key for a human-readable group name.
    pub fn derive(name: &str) -> Self {
        let mut cid = CID_V1_RAW_SHA256.to_vec();
        cid.extend_from_slice(&Sha256::digest(name.as_bytes()));
        Self(format!("b{}", BASE32_NOPAD.encode(&cid).to_ascii_lowercase()))
    }

    /// Wrap an already-derived key, e.g. one taken from a request path.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn relay() -> Self {
        Self::derive(RELAY_RENDEZVOUS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Envelopes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResp {
    pub status: bool,
}

impl StatusResp {
    pub const OK: Self = Self { status: true };
    pub const FAILED: Self = Self { status: false };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerResp {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr_info: Option<AddrInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidersResp {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr_infos: Option<HashMap<String, AddrInfo>>,
}

/// Answer to fingerprint and server-id lookups. `{}` when nothing is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdResp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<PeerId>,
}

/// Form body of a provide request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvideForm {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub addrs: String,
    #[serde(default)]
    pub fingerprint: String,
}
