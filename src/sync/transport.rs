// Outbound control-plane transport
//
// Peers are dialed over short-lived connections: one round trip per socket,
// closed on every exit path. Outcomes feed the peer table's liveness flags.
// Sends toward a peer that failed recently are suppressed to damp retry
// storms; blocking calls always attempt.

use crate::clock::LogicalClock;
use crate::cluster::peer::PeerTable;
use crate::error::{FlockError, Result};
use crate::sync::frame::{read_frame, write_frame};
use crate::sync::message::{SyncBody, SyncEnvelope, SyncReply};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub struct SyncTransport {
    local_id: String,
    peers: Arc<PeerTable>,
    clock: Arc<LogicalClock>,
    // node id -> instant of the last failed dial
    last_failed: DashMap<String, Instant>,
    suppression_window: Duration,
    send_timeout: Duration,
    request_timeout: Duration,
}

impl SyncTransport {
    pub fn new(
        local_id: impl Into<String>,
        peers: Arc<PeerTable>,
        clock: Arc<LogicalClock>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            peers,
            clock,
            last_failed: DashMap::new(),
            suppression_window: Duration::from_secs(10),
            send_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(3),
        }
    }

    pub fn with_timeouts(
        mut self,
        suppression_window: Duration,
        send_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        self.suppression_window = suppression_window;
        self.send_timeout = send_timeout;
        self.request_timeout = request_timeout;
        self
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    /// Fire-and-forget send. Dropped silently when the target failed within
    /// the suppression window; otherwise a background worker performs the
    /// round trip and updates the peer's liveness.
    pub fn send(self: &Arc<Self>, target: &str, body: SyncBody) {
        if self.suppressed(target) {
            tracing::trace!(
                "suppressing {} to {} after recent failure",
                body.action_name(),
                target
            );
            return;
        }
        let transport = Arc::clone(self);
        let target = target.to_string();
        tokio::spawn(async move {
            let deadline = transport.send_timeout;
            if let Err(e) = transport.dial(&target, body, deadline).await {
                tracing::debug!("send to {} failed: {}", target, e);
            }
        });
    }

    /// Synchronous round trip. Always attempts, regardless of suppression,
    /// because the caller blocks on the answer.
    pub async fn send_with_response(&self, target: &str, body: SyncBody) -> Result<SyncReply> {
        self.dial(target, body, self.request_timeout).await
    }

    /// Send to every active peer except self.
    pub fn broadcast(self: &Arc<Self>, body: SyncBody) {
        for peer in self.peers.active_peers() {
            self.send(&peer.node_id, body.clone());
        }
    }

    fn suppressed(&self, target: &str) -> bool {
        self.last_failed
            .get(target)
            .map(|stamp| stamp.elapsed() < self.suppression_window)
            .unwrap_or(false)
    }

    async fn dial(&self, target: &str, body: SyncBody, deadline: Duration) -> Result<SyncReply> {
        if target == self.local_id {
            return Err(FlockError::Internal(
                "refusing to dial the local node".to_string(),
            ));
        }
        let entry = self
            .peers
            .get(target)
            .ok_or_else(|| FlockError::PeerUnreachable(format!("unknown peer {}", target)))?;

        let action = body.action_name();
        let envelope = SyncEnvelope::new(self.clock.tick(), body);
        let payload = serde_json::to_vec(&envelope)?;

        match self.round_trip(&entry.sync_target(), &payload, deadline).await {
            Ok(reply) => {
                if let Some(observed) = reply.logical_time {
                    self.clock.merge(observed);
                }
                self.record_success(target);
                Ok(reply)
            }
            Err(e) => {
                self.record_failure(target);
                tracing::debug!("{} to {} failed: {}", action, target, e);
                Err(FlockError::PeerUnreachable(format!("{}: {}", target, e)))
            }
        }
    }

    async fn round_trip(
        &self,
        addr: &str,
        payload: &[u8],
        deadline: Duration,
    ) -> Result<SyncReply> {
        let mut stream = timeout(deadline, TcpStream::connect(addr))
            .await
            .map_err(|_| FlockError::Timeout(format!("connect to {}", addr)))?
            .map_err(|e| FlockError::Network(e.to_string()))?;

        timeout(deadline, write_frame(&mut stream, payload))
            .await
            .map_err(|_| FlockError::Timeout(format!("send to {}", addr)))??;

        let frame = timeout(deadline, read_frame(&mut stream))
            .await
            .map_err(|_| FlockError::Timeout(format!("reply from {}", addr)))??
            .ok_or_else(|| FlockError::Network("connection closed before reply".to_string()))?;

        let reply: SyncReply = serde_json::from_slice(&frame)?;
        Ok(reply)
    }

    fn record_success(&self, target: &str) {
        self.last_failed.remove(target);
        if self.peers.set_active(target, true) == Some(false) {
            tracing::info!("peer {} is reachable again", target);
        }
    }

    fn record_failure(&self, target: &str) {
        self.last_failed.insert(target.to_string(), Instant::now());
        if self.peers.set_active(target, false) == Some(true) {
            tracing::warn!("peer {} marked inactive", target);
        }
    }
}
