use std::sync::Arc;

use hoard_types::HashSpan;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::traits::ChunkStore;

/// A peer as seen by the network status table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub host: String,
    #[serde(default = "default_true")]
    pub online: bool,
    #[serde(default = "default_true")]
    pub core: bool,
    #[serde(default = "default_true")]
    pub writable: bool,
    #[serde(default)]
    pub hash_spans: Vec<HashSpan>,
}

fn default_true() -> bool {
    true
}

impl PeerDescriptor {
    /// An online, core, writable peer with no declared spans.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            online: true,
            core: true,
            writable: true,
            hash_spans: Vec::new(),
        }
    }

    /// Peers worth reading from.
    pub fn is_readable(&self) -> bool {
        self.online && self.core
    }

    /// Peers worth writing to.
    pub fn is_writable(&self) -> bool {
        self.online && self.core && self.writable
    }
}

/// Source of the currently known set of peers.
pub trait Topology: Send + Sync {
    fn peers(&self) -> Vec<PeerDescriptor>;
}

/// Opens connections to peers by host name.
pub trait Connector: Send + Sync {
    fn connect(&self, host: &str) -> StoreResult<Arc<dyn ChunkStore>>;
}

/// A fixed peer list, typically loaded from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticTopology {
    peers: Vec<PeerDescriptor>,
}

impl StaticTopology {
    pub fn new(peers: Vec<PeerDescriptor>) -> Self {
        Self { peers }
    }
}

impl Topology for StaticTopology {
    fn peers(&self) -> Vec<PeerDescriptor> {
        self.peers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_and_writable_flags() {
        let mut peer = PeerDescriptor::new("a");
        assert!(peer.is_readable());
        assert!(peer.is_writable());

        peer.writable = false;
        assert!(peer.is_readable());
        assert!(!peer.is_writable());

        peer.online = false;
        assert!(!peer.is_readable());
    }

    #[test]
    fn non_core_peers_are_ignored() {
        let mut peer = PeerDescriptor::new("edge");
        peer.core = false;
        assert!(!peer.is_readable());
        assert!(!peer.is_writable());
    }

    #[test]
    fn static_topology_returns_peers() {
        let topology = StaticTopology::new(vec![PeerDescriptor::new("a"), PeerDescriptor::new("b")]);
        assert_eq!(topology.peers().len(), 2);
    }

    #[test]
    fn descriptor_flags_default_on() {
        let peer: PeerDescriptor = toml::from_str(r#"host = "x""#).unwrap();
        assert!(peer.online && peer.core && peer.writable);
        assert!(peer.hash_spans.is_empty());
    }
}
