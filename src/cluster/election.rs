// Bully coordinator election
//
// The coordinator drives clock synchronization. Any node that cannot find a
// live coordinator starts an election against every active peer with a
// higher id; if none answers within the response window it declares itself.
// A COORDINATOR message from a higher id always wins, which closes the
// transient dual-coordinator window.

use crate::cluster::peer::PeerTable;
use crate::sync::message::{SyncBody, SyncReply};
use crate::sync::transport::SyncTransport;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub struct BullyElection {
    local_id: String,
    peers: Arc<PeerTable>,
    transport: Arc<SyncTransport>,
    is_coordinator: AtomicBool,
    election_in_progress: AtomicBool,
    responded: RwLock<HashSet<String>>,
    current_coordinator: RwLock<Option<String>>,
    response_window: Duration,
}

impl BullyElection {
    pub fn new(
        local_id: impl Into<String>,
        peers: Arc<PeerTable>,
        transport: Arc<SyncTransport>,
        response_window: Duration,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            peers,
            transport,
            is_coordinator: AtomicBool::new(false),
            election_in_progress: AtomicBool::new(false),
            responded: RwLock::new(HashSet::new()),
            current_coordinator: RwLock::new(None),
            response_window,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.is_coordinator.load(Ordering::SeqCst)
    }

    pub fn coordinator(&self) -> Option<String> {
        self.current_coordinator.read().unwrap().clone()
    }

    /// Periodic coordinator check. A coordinator heartbeats; everyone else
    /// verifies a coordinator exists and is answering.
    pub fn spawn_check_task(
        self: &Arc<Self>,
        interval: Duration,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let election = Arc::clone(self);
        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                sleep(interval).await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                election.check_coordinator().await;
            }
            tracing::debug!("coordinator check task stopped");
        })
    }

    pub async fn check_coordinator(self: &Arc<Self>) {
        if self.is_coordinator() {
            self.transport.broadcast(SyncBody::CoordinatorHeartbeat {
                coordinator_id: self.local_id.clone(),
            });
            return;
        }

        // Ask around for a node that believes it is the coordinator.
        let mut claimed: Option<String> = None;
        for peer in self.peers.active_data_peers() {
            let result = self
                .transport
                .send_with_response(
                    &peer.node_id,
                    SyncBody::IsCoordinatorRequest {
                        node_id: self.local_id.clone(),
                    },
                )
                .await;
            if let Ok(reply) = result {
                if reply.is_coordinator == Some(true) {
                    claimed = Some(peer.node_id);
                    break;
                }
            }
        }

        match claimed {
            None => {
                tracing::info!("no coordinator found, starting election");
                self.start_election();
            }
            Some(coordinator) => {
                let result = self
                    .transport
                    .send_with_response(
                        &coordinator,
                        SyncBody::CoordinatorPing {
                            node_id: self.local_id.clone(),
                        },
                    )
                    .await;
                match result {
                    Ok(reply) if reply.success => {
                        *self.current_coordinator.write().unwrap() = Some(coordinator);
                    }
                    _ => {
                        tracing::warn!("coordinator {} not answering, starting election", coordinator);
                        self.start_election();
                    }
                }
            }
        }
    }

    /// Begin an election unless one is already in flight.
    pub fn start_election(self: &Arc<Self>) {
        if self
            .election_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let higher = self.peers.higher_peers();
        if higher.is_empty() {
            self.declare_coordinator();
            return;
        }

        tracing::info!(
            "election started against {} higher node(s)",
            higher.len()
        );
        self.responded.write().unwrap().clear();

        for peer in &higher {
            let election = Arc::clone(self);
            let target = peer.node_id.clone();
            tokio::spawn(async move {
                let result = election
                    .transport
                    .send_with_response(
                        &target,
                        SyncBody::Election {
                            from_server: election.local_id.clone(),
                        },
                    )
                    .await;
                if let Ok(reply) = result {
                    if reply.success {
                        election.note_response(reply.node_id.unwrap_or(target));
                    }
                }
            });
        }

        let election = Arc::clone(self);
        let higher_ids: HashSet<String> = higher.into_iter().map(|p| p.node_id).collect();
        tokio::spawn(async move {
            sleep(election.response_window).await;
            election.finish_election(&higher_ids);
        });
    }

    fn finish_election(self: &Arc<Self>, higher_ids: &HashSet<String>) {
        // A COORDINATOR message may have settled things mid-window.
        if !self.election_in_progress.load(Ordering::SeqCst) {
            return;
        }
        let any_higher_alive = {
            let responded = self.responded.read().unwrap();
            responded.iter().any(|id| higher_ids.contains(id))
        };
        if any_higher_alive {
            tracing::info!("higher node answered the election, standing down");
            self.election_in_progress.store(false, Ordering::SeqCst);
        } else {
            self.declare_coordinator();
        }
    }

    fn declare_coordinator(self: &Arc<Self>) {
        self.is_coordinator.store(true, Ordering::SeqCst);
        *self.current_coordinator.write().unwrap() = Some(self.local_id.clone());
        tracing::info!("declared self coordinator");
        self.transport.broadcast(SyncBody::Coordinator {
            coordinator_id: self.local_id.clone(),
        });
        self.election_in_progress.store(false, Ordering::SeqCst);
    }

    fn note_response(&self, node_id: String) {
        self.responded.write().unwrap().insert(node_id);
    }

    // Inbound handlers

    /// ELECTION from a peer: always answer, and out-bully the sender when
    /// this node's id is higher.
    pub fn handle_election(self: &Arc<Self>, from: String) -> SyncReply {
        tracing::debug!("election message from {}", from);
        if self.local_id > from {
            self.start_election();
        }
        SyncReply::ok_from(self.local_id.clone())
    }

    pub fn handle_election_response(&self, from: String) -> SyncReply {
        self.note_response(from);
        SyncReply::ok_from(self.local_id.clone())
    }

    /// COORDINATOR or COORDINATOR_HEARTBEAT observed.
    pub fn handle_coordinator(&self, coordinator_id: String) -> SyncReply {
        if coordinator_id != self.local_id && self.is_coordinator() {
            if self.local_id < coordinator_id {
                tracing::warn!("stepping down for higher coordinator {}", coordinator_id);
                self.is_coordinator.store(false, Ordering::SeqCst);
            } else {
                // This node outranks the sender; the next heartbeat
                // broadcast corrects it.
                tracing::warn!(
                    "ignoring coordinator claim from lower node {}",
                    coordinator_id
                );
                return SyncReply::ok_from(self.local_id.clone());
            }
        }
        *self.current_coordinator.write().unwrap() = Some(coordinator_id);
        self.election_in_progress.store(false, Ordering::SeqCst);
        SyncReply::ok_from(self.local_id.clone())
    }

    pub fn handle_coordinator_ping(&self, from: &str) -> SyncReply {
        tracing::trace!("coordinator ping from {}", from);
        SyncReply::coordinator_status(self.local_id.clone(), self.is_coordinator())
    }

    pub fn handle_is_coordinator_request(&self) -> SyncReply {
        SyncReply::coordinator_status(self.local_id.clone(), self.is_coordinator())
    }
}
