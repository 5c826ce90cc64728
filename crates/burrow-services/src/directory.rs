//! Peer directory, the rendezvous server's in-memory registry.
//!
//! Three maps (peer records, provider groups, fingerprints) sit behind one
//! mutex. Readers and writers both take it, so every update is totally
//! ordered and a reader never sees half of a `provide`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use burrow_core::addr::{parse_addr_list, AddrError, AddrInfo, PeerId};
use burrow_core::wire::Namespace;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("invalid address list: {0}")]
    InvalidAddrs(#[from] AddrError),
    #[error("peer not found")]
    PeerNotFound,
    #[error("namespace not found")]
    NamespaceNotFound,
    #[error("fingerprint not found")]
    FingerprintNotFound,
}

/// Provider group: peer-id string → that peer's entry.
pub type ProviderGroup = HashMap<String, AddrInfo>;

#[derive(Default)]
struct Tables {
    peers: HashMap<PeerId, AddrInfo>,
    providers: HashMap<Namespace, ProviderGroup>,
    fingerprints: HashMap<String, PeerId>,
}

#[derive(Default)]
pub struct PeerDirectory {
    tables: Mutex<Tables>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panicking holder cannot leave a half-written provide behind: all
        // writes happen after parsing succeeds.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current address set for `id`.
    pub fn find(&self, id: &PeerId) -> Result<AddrInfo, DirectoryError> {
        self.lock()
            .peers
            .get(id)
            .cloned()
            .ok_or(DirectoryError::PeerNotFound)
    }

    /// Register or overwrite `id` under `namespace`.
    ///
    /// `raw_addrs` is the comma-joined address list. If any entry is
    /// malformed nothing is written. An empty `fingerprint` leaves the
    /// fingerprint table alone.
    pub fn provide(
        &self,
        namespace: &Namespace,
        id: &PeerId,
        raw_addrs: &str,
        fingerprint: &str,
    ) -> Result<(), DirectoryError> {
        let mut tables = self.lock();
        let info = AddrInfo::new(id.clone(), parse_addr_list(raw_addrs)?);

        tables
            .providers
            .entry(namespace.clone())
            .or_default()
            .insert(id.to_string(), info.clone());
        if !fingerprint.is_empty() {
            tables.fingerprints.insert(fingerprint.to_string(), id.clone());
        }
        tables.peers.insert(id.clone(), info);

        tracing::debug!(peer = %id, namespace = %namespace, "peer provided");
        Ok(())
    }

    /// Snapshot of everyone advertising under `namespace`.
    pub fn find_providers(&self, namespace: &Namespace) -> Result<ProviderGroup, DirectoryError> {
        self.lock()
            .providers
            .get(namespace)
            .cloned()
            .ok_or(DirectoryError::NamespaceNotFound)
    }

    pub fn find_peer_id(&self, fingerprint: &str) -> Option<PeerId> {
        self.lock().fingerprints.get(fingerprint).cloned()
    }

    /// Drop the fingerprint mapping only; the peer record stays.
    pub fn delete_fingerprint(&self, fingerprint: &str) -> Result<(), DirectoryError> {
        self.lock()
            .fingerprints
            .remove(fingerprint)
            .map(|_| ())
            .ok_or(DirectoryError::FingerprintNotFound)
    }

    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }
}

/// The well-known relay peer's identity. Last write wins.
#[derive(Clone, Default)]
pub struct ServerIdSlot(Arc<RwLock<Option<PeerId>>>);

impl ServerIdSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<PeerId> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, id: PeerId) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }
}
