// Reduced sync responder for the balancer role
//
// Accepts pings and announcements so the routing table stays current, and
// always denies being coordinator. Election and clock-sync messages are
// acknowledged without effect; replication is acknowledged as a no-op.

use crate::cluster::discovery::parse_sync_port;
use crate::cluster::peer::{PeerEntry, PeerTable};
use crate::sync::message::{SyncBody, SyncReply};
use crate::sync::server::SyncHandler;
use async_trait::async_trait;
use std::sync::Arc;

pub struct BalancerSyncHandler {
    local_id: String,
    peers: Arc<PeerTable>,
}

impl BalancerSyncHandler {
    pub fn new(local_id: impl Into<String>, peers: Arc<PeerTable>) -> Self {
        Self {
            local_id: local_id.into(),
            peers,
        }
    }

    fn register_backend(
        &self,
        node_id: String,
        address: String,
        service_port: u16,
        sync_address: String,
    ) -> SyncReply {
        let Some(sync_port) = parse_sync_port(&sync_address) else {
            return SyncReply::failure(format!("unparseable sync address '{}'", sync_address));
        };
        let mut entry = PeerEntry::new(node_id.clone(), address, sync_port);
        entry.service_port = service_port;
        if self.peers.upsert(entry) {
            tracing::info!(
                "registered backend {} (service port {})",
                node_id,
                service_port
            );
        }
        SyncReply::ok_from(self.local_id.clone())
    }
}

#[async_trait]
impl SyncHandler for BalancerSyncHandler {
    async fn handle(&self, body: SyncBody) -> SyncReply {
        match body {
            SyncBody::ServerPing { .. } => SyncReply::ping_ack(self.local_id.clone()),
            SyncBody::ServerAnnouncement {
                node_id,
                address,
                service_port,
                sync_address,
            } => self.register_backend(node_id, address, service_port, sync_address),
            SyncBody::IsCoordinatorRequest { .. } => {
                SyncReply::coordinator_status(self.local_id.clone(), false)
            }
            SyncBody::DataReplication {
                source_server_id, ..
            } => {
                // Balancers hold no repositories; acknowledge and drop.
                tracing::trace!("ignoring replication event from {}", source_server_id);
                SyncReply::ok_from(self.local_id.clone())
            }
            other => {
                // Election and clock-sync traffic is acknowledged, never
                // acted upon.
                tracing::trace!("acknowledging {} without effect", other.action_name());
                SyncReply::ok_from(self.local_id.clone())
            }
        }
    }
}
