// Backend registry
//
// The routing view over the balancer's peer table: active non-balancer
// peers with a known service port, in stable id order so the round-robin
// index walks them fairly. The index advances exactly once per routed
// request.

use crate::cluster::peer::{PeerEntry, PeerTable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct BackendRegistry {
    peers: Arc<PeerTable>,
    next_index: AtomicU64,
}

impl BackendRegistry {
    pub fn new(peers: Arc<PeerTable>) -> Self {
        Self {
            peers,
            next_index: AtomicU64::new(0),
        }
    }

    /// Live backends in stable order.
    pub fn active_backends(&self) -> Vec<PeerEntry> {
        let mut backends: Vec<PeerEntry> = self
            .peers
            .snapshot()
            .into_iter()
            .filter(|p| {
                p.active
                    && !p.is_balancer()
                    && p.node_id != self.peers.local_id()
                    && p.service_port != 0
            })
            .collect();
        backends.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        backends
    }

    /// Round-robin selection over the current snapshot.
    pub fn next_backend(&self) -> Option<PeerEntry> {
        let backends = self.active_backends();
        if backends.is_empty() {
            return None;
        }
        let index = self.next_index.fetch_add(1, Ordering::SeqCst) as usize % backends.len();
        Some(backends[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn registry_with(backends: &[(&str, u16)]) -> BackendRegistry {
        let peers = Arc::new(PeerTable::new("balancer"));
        for (id, port) in backends {
            let mut entry = PeerEntry::new(*id, "127.0.0.1", 6000);
            entry.service_port = *port;
            peers.upsert(entry);
        }
        BackendRegistry::new(peers)
    }

    #[test]
    fn test_round_robin_is_fair() {
        let registry = registry_with(&[("b1", 7000), ("b2", 7001), ("b3", 7002)]);

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..9 {
            let backend = registry.next_backend().unwrap();
            *counts.entry(backend.node_id).or_insert(0) += 1;
        }
        assert_eq!(counts["b1"], 3);
        assert_eq!(counts["b2"], 3);
        assert_eq!(counts["b3"], 3);
    }

    #[test]
    fn test_empty_registry() {
        let registry = registry_with(&[]);
        assert!(registry.next_backend().is_none());
    }

    #[test]
    fn test_inactive_and_portless_backends_skipped() {
        let registry = registry_with(&[("b1", 7000), ("b2", 7001)]);
        registry.peers.set_active("b2", false);
        // A peer announced without a service port is not routable.
        registry.peers.upsert(PeerEntry::new("b4", "127.0.0.1", 6004));

        for _ in 0..4 {
            assert_eq!(registry.next_backend().unwrap().node_id, "b1");
        }
    }

    #[test]
    fn test_balancer_peers_never_selected() {
        let registry = registry_with(&[("b1", 7000)]);
        let mut sibling = PeerEntry::new("balancer-2", "127.0.0.1", 6010);
        sibling.service_port = 5001;
        registry.peers.upsert(sibling);

        for _ in 0..4 {
            assert_eq!(registry.next_backend().unwrap().node_id, "b1");
        }
    }
}
