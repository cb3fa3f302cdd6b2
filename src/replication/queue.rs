// Outbound replication queue
//
// Single-producer-per-mutation FIFO drained by one dedicated worker. The
// worker fans each event out to every active data peer; a failed send is
// not re-enqueued. Balancers are never part of the fan-out set.

use crate::replication::event::ReplicationEvent;
use crate::sync::message::SyncBody;
use crate::sync::transport::SyncTransport;
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub struct ReplicationQueue {
    events: SegQueue<ReplicationEvent>,
}

impl ReplicationQueue {
    pub fn new() -> Self {
        Self {
            events: SegQueue::new(),
        }
    }

    pub fn enqueue(&self, event: ReplicationEvent) {
        tracing::debug!(
            "queued {:?} for {}",
            event.event_type,
            event.entity_id
        );
        self.events.push(event);
    }

    pub fn pop(&self) -> Option<ReplicationEvent> {
        self.events.pop()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for ReplicationQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the drainer worker. It polls the queue, sleeping briefly when
/// empty, and stops when the running flag clears.
pub fn spawn_drainer(
    queue: Arc<ReplicationQueue>,
    transport: Arc<SyncTransport>,
    running: Arc<AtomicBool>,
    idle_sleep: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let source_id = transport.local_id().to_string();
        while running.load(Ordering::SeqCst) {
            match queue.pop() {
                Some(event) => {
                    let body = SyncBody::DataReplication {
                        source_server_id: source_id.clone(),
                        event_type: event.event_type,
                        entity_id: event.entity_id.clone(),
                        timestamp: event.timestamp,
                        data: event.data.clone(),
                    };
                    let targets = transport.peers().active_data_peers();
                    tracing::debug!(
                        "replicating {:?} for {} to {} peers",
                        event.event_type,
                        event.entity_id,
                        targets.len()
                    );
                    for peer in targets {
                        transport.send(&peer.node_id, body.clone());
                    }
                }
                None => sleep(idle_sleep).await,
            }
        }
        tracing::debug!("replication drainer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::event::EventType;

    #[test]
    fn test_fifo_order() {
        let queue = ReplicationQueue::new();
        for i in 0..3 {
            queue.enqueue(ReplicationEvent {
                event_type: EventType::PostCreated,
                entity_id: format!("p{}", i),
                timestamp: i,
                data: serde_json::Value::Null,
            });
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().entity_id, "p0");
        assert_eq!(queue.pop().unwrap().entity_id, "p1");
        assert_eq!(queue.pop().unwrap().entity_id, "p2");
        assert!(queue.pop().is_none());
    }
}
