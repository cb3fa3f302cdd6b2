// Discovery
//
// Two periodic duties: ping every known peer so liveness flags track
// reality, and announce this node's presence so peers learn its ports.
// Announcements go out shortly after startup and again whenever an unknown
// peer announces itself, so a fresh node and the rest of the cluster
// converge on each other quickly.

use crate::cluster::peer::{PeerEntry, PeerTable};
use crate::sync::message::{SyncBody, SyncReply};
use crate::sync::transport::SyncTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub struct Discovery {
    local_id: String,
    local_address: String,
    local_service_port: u16,
    local_sync_address: String,
    peers: Arc<PeerTable>,
    transport: Arc<SyncTransport>,
}

impl Discovery {
    pub fn new(
        local_id: impl Into<String>,
        local_address: impl Into<String>,
        local_service_port: u16,
        local_sync_port: u16,
        peers: Arc<PeerTable>,
        transport: Arc<SyncTransport>,
    ) -> Self {
        let local_address = local_address.into();
        let local_sync_address = format!("tcp://{}:{}", local_address, local_sync_port);
        Self {
            local_id: local_id.into(),
            local_address,
            local_service_port,
            local_sync_address,
            peers,
            transport,
        }
    }

    /// Ping every peer other than self on a fixed interval. The transport
    /// flips the active flag from the outcome of each call.
    pub fn spawn_ping_task(
        self: &Arc<Self>,
        interval: Duration,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let discovery = Arc::clone(self);
        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                sleep(interval).await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                for peer in discovery.peers.remote_peers() {
                    let result = discovery
                        .transport
                        .send_with_response(
                            &peer.node_id,
                            SyncBody::ServerPing {
                                node_id: discovery.local_id.clone(),
                            },
                        )
                        .await;
                    if let Err(e) = result {
                        tracing::debug!("ping to {} failed: {}", peer.node_id, e);
                    }
                }
            }
            tracing::debug!("discovery ping task stopped");
        })
    }

    /// Announce once, a little after startup, when peers are likely up.
    pub fn spawn_announce_task(
        self: &Arc<Self>,
        delay: Duration,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let discovery = Arc::clone(self);
        tokio::spawn(async move {
            sleep(delay).await;
            if running.load(Ordering::SeqCst) {
                discovery.announce_to_all();
            }
        })
    }

    /// Send this node's announcement to every known peer.
    pub fn announce_to_all(&self) {
        let body = self.announcement_body();
        for peer in self.peers.remote_peers() {
            self.transport.send(&peer.node_id, body.clone());
        }
    }

    fn announcement_body(&self) -> SyncBody {
        SyncBody::ServerAnnouncement {
            node_id: self.local_id.clone(),
            address: self.local_address.clone(),
            service_port: self.local_service_port,
            sync_address: self.local_sync_address.clone(),
        }
    }

    pub fn handle_ping(&self, from: &str) -> SyncReply {
        tracing::trace!("ping from {}", from);
        SyncReply::ping_ack(self.local_id.clone())
    }

    pub fn handle_announcement(
        self: &Arc<Self>,
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
        let was_unknown = self.peers.upsert(entry);

        if was_unknown {
            tracing::info!("discovered new peer {} at {}", node_id, sync_address);
            // Announce back so the newcomer fills its own table.
            let discovery = Arc::clone(self);
            tokio::spawn(async move {
                discovery.announce_to_all();
            });
        }
        SyncReply::ok_from(self.local_id.clone())
    }
}

/// Extract the port from a sync address, tolerating both `tcp://host:port`
/// and bare `host:port` forms.
pub fn parse_sync_port(sync_address: &str) -> Option<u16> {
    let trimmed = sync_address
        .strip_prefix("tcp://")
        .unwrap_or(sync_address);
    let (_, port) = trimmed.rsplit_once(':')?;
    port.parse::<u16>().ok()
}
