//! Read-only view of the peers that support ledger sync.

use ledger_sync_types::PeerId;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

/// Directory of connected peers that speak the ledger sync protocol.
///
/// Owned by the peer manager; the sync protocol only reads it. A peer that is
/// banned or disconnected must stop being reported by [`has_peer`].
///
/// [`has_peer`]: PeerDirectory::has_peer
pub trait PeerDirectory: Send + Sync {
    /// All ledger-sync peers, in a stable order.
    fn peers(&self) -> Vec<PeerId>;

    fn has_peer(&self, peer: &PeerId) -> bool;
}

impl<T: PeerDirectory + ?Sized> PeerDirectory for Arc<T> {
    fn peers(&self) -> Vec<PeerId> {
        (**self).peers()
    }

    fn has_peer(&self, peer: &PeerId) -> bool {
        (**self).has_peer(peer)
    }
}

/// In-memory directory backed by a shared set.
///
/// Clones share the same underlying set, so a runner can hand one clone to
/// the protocol and keep another to apply connects, disconnects and bans.
#[derive(Debug, Clone, Default)]
pub struct SharedPeerDirectory {
    peers: Arc<RwLock<BTreeSet<PeerId>>>,
}

impl SharedPeerDirectory {
    pub fn new(peers: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            peers: Arc::new(RwLock::new(peers.into_iter().collect())),
        }
    }

    /// Returns true if the peer was not already present.
    pub fn add(&self, peer: PeerId) -> bool {
        match self.peers.write() {
            Ok(mut peers) => peers.insert(peer),
            Err(poisoned) => poisoned.into_inner().insert(peer),
        }
    }

    /// Returns true if the peer was present.
    pub fn remove(&self, peer: &PeerId) -> bool {
        match self.peers.write() {
            Ok(mut peers) => peers.remove(peer),
            Err(poisoned) => poisoned.into_inner().remove(peer),
        }
    }
}

impl PeerDirectory for SharedPeerDirectory {
    fn peers(&self) -> Vec<PeerId> {
        match self.peers.read() {
            Ok(peers) => peers.iter().copied().collect(),
            Err(poisoned) => poisoned.into_inner().iter().copied().collect(),
        }
    }

    fn has_peer(&self, peer: &PeerId) -> bool {
        match self.peers.read() {
            Ok(peers) => peers.contains(peer),
            Err(poisoned) => poisoned.into_inner().contains(peer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_membership() {
        let directory = SharedPeerDirectory::new([PeerId(2), PeerId(1)]);
        let view = directory.clone();

        assert_eq!(view.peers(), vec![PeerId(1), PeerId(2)]);
        assert!(directory.remove(&PeerId(1)));
        assert!(!view.has_peer(&PeerId(1)));
        assert!(directory.add(PeerId(3)));
        assert!(!directory.add(PeerId(3)));
        assert_eq!(view.peers(), vec![PeerId(2), PeerId(3)]);
    }
}
