// Peer table
//
// One entry per known node, keyed by node id. Entries are inserted from the
// seed list at boot or on receipt of an announcement, flipped active or
// inactive by discovery pings and transport outcomes, and never evicted in
// normal operation. The local node's own entry is present but never dialed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

// Node identifier; ordered by byte comparison, which is also the election
// tie-break.
pub type NodeId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    pub node_id: NodeId,
    pub address: String,
    pub sync_port: u16,
    /// Base client-service port, learned from announcements; zero until known
    pub service_port: u16,
    pub active: bool,
}

impl PeerEntry {
    pub fn new(node_id: impl Into<NodeId>, address: impl Into<String>, sync_port: u16) -> Self {
        Self {
            node_id: node_id.into(),
            address: address.into(),
            sync_port,
            service_port: 0,
            active: true,
        }
    }

    pub fn sync_target(&self) -> String {
        format!("{}:{}", self.address, self.sync_port)
    }

    /// Balancers are identified by their id: the literal `balancer` or any
    /// id with that prefix.
    pub fn is_balancer(&self) -> bool {
        is_balancer_id(&self.node_id)
    }
}

pub fn is_balancer_id(node_id: &str) -> bool {
    node_id == "balancer" || node_id.starts_with("balancer")
}

pub struct PeerTable {
    local_id: NodeId,
    peers: RwLock<HashMap<NodeId, PeerEntry>>,
}

impl PeerTable {
    pub fn new(local_id: impl Into<NodeId>) -> Self {
        Self {
            local_id: local_id.into(),
            peers: RwLock::new(HashMap::new()),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Insert or refresh an entry. Returns true when the peer was previously
    /// unknown.
    pub fn upsert(&self, entry: PeerEntry) -> bool {
        let mut peers = self.peers.write().unwrap();
        match peers.get_mut(&entry.node_id) {
            Some(existing) => {
                existing.address = entry.address;
                existing.sync_port = entry.sync_port;
                if entry.service_port != 0 {
                    existing.service_port = entry.service_port;
                }
                existing.active = true;
                false
            }
            None => {
                peers.insert(entry.node_id.clone(), entry);
                true
            }
        }
    }

    pub fn get(&self, node_id: &str) -> Option<PeerEntry> {
        self.peers.read().unwrap().get(node_id).cloned()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.peers.read().unwrap().contains_key(node_id)
    }

    /// Flip the active flag. Returns the previous value, or None for an
    /// unknown peer.
    pub fn set_active(&self, node_id: &str, active: bool) -> Option<bool> {
        let mut peers = self.peers.write().unwrap();
        peers.get_mut(node_id).map(|entry| {
            let previous = entry.active;
            entry.active = active;
            previous
        })
    }

    /// Snapshot of every entry, for iteration outside the lock.
    pub fn snapshot(&self) -> Vec<PeerEntry> {
        self.peers.read().unwrap().values().cloned().collect()
    }

    /// Active peers excluding the local node.
    pub fn active_peers(&self) -> Vec<PeerEntry> {
        self.peers
            .read()
            .unwrap()
            .values()
            .filter(|p| p.active && p.node_id != self.local_id)
            .cloned()
            .collect()
    }

    /// Remote peers regardless of liveness.
    pub fn remote_peers(&self) -> Vec<PeerEntry> {
        self.peers
            .read()
            .unwrap()
            .values()
            .filter(|p| p.node_id != self.local_id)
            .cloned()
            .collect()
    }

    /// Active data peers: the replication fan-out set. Excludes self and any
    /// balancer.
    pub fn active_data_peers(&self) -> Vec<PeerEntry> {
        self.peers
            .read()
            .unwrap()
            .values()
            .filter(|p| p.active && p.node_id != self.local_id && !p.is_balancer())
            .cloned()
            .collect()
    }

    /// Active data peers with an id strictly greater than the local id.
    /// Balancers never take part in elections, so they are excluded here.
    pub fn higher_peers(&self) -> Vec<PeerEntry> {
        self.peers
            .read()
            .unwrap()
            .values()
            .filter(|p| p.active && !p.is_balancer() && p.node_id > self.local_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PeerTable {
        let table = PeerTable::new("b2");
        table.upsert(PeerEntry::new("b1", "127.0.0.1", 6000));
        table.upsert(PeerEntry::new("b2", "127.0.0.1", 6001));
        table.upsert(PeerEntry::new("b3", "127.0.0.1", 6002));
        table.upsert(PeerEntry::new("balancer-1", "127.0.0.1", 6003));
        table
    }

    #[test]
    fn test_upsert_reports_new_peers() {
        let table = PeerTable::new("b1");
        assert!(table.upsert(PeerEntry::new("b2", "127.0.0.1", 6000)));
        assert!(!table.upsert(PeerEntry::new("b2", "127.0.0.1", 6000)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_upsert_keeps_known_service_port() {
        let table = PeerTable::new("b1");
        let mut entry = PeerEntry::new("b2", "127.0.0.1", 6000);
        entry.service_port = 7000;
        table.upsert(entry);

        // A later announcement without a service port keeps the known one.
        table.upsert(PeerEntry::new("b2", "127.0.0.1", 6000));
        assert_eq!(table.get("b2").unwrap().service_port, 7000);
    }

    #[test]
    fn test_active_peers_excludes_self() {
        let table = table();
        let active = table.active_peers();
        assert_eq!(active.len(), 3);
        assert!(active.iter().all(|p| p.node_id != "b2"));
    }

    #[test]
    fn test_data_peers_exclude_balancers() {
        let table = table();
        let data = table.active_data_peers();
        assert_eq!(data.len(), 2);
        assert!(data.iter().all(|p| !p.is_balancer()));
    }

    #[test]
    fn test_set_active_returns_previous() {
        let table = table();
        assert_eq!(table.set_active("b3", false), Some(true));
        assert_eq!(table.set_active("b3", false), Some(false));
        assert_eq!(table.set_active("missing", true), None);
        assert_eq!(table.active_peers().len(), 2);
    }

    #[test]
    fn test_higher_peers_skip_balancers() {
        let table = table();
        let higher = table.higher_peers();
        assert_eq!(higher.len(), 1);
        assert_eq!(higher[0].node_id, "b3");
    }

    #[test]
    fn test_balancer_id_rule() {
        assert!(is_balancer_id("balancer"));
        assert!(is_balancer_id("balancer-2"));
        assert!(!is_balancer_id("b1"));
    }
}
