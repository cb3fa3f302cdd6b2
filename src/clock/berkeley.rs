// Berkeley clock synchronization
//
// The coordinator periodically collects physical-clock differences from
// every active peer, averages them (counting itself as zero drift), moves
// its own clock by the negated average and sends each responder the
// adjustment that brings it onto the same average. Round-trip delay is not
// compensated. Responses arriving after the collection window are
// discarded.

use crate::clock::physical::PhysicalClock;
use crate::cluster::election::BullyElection;
use crate::sync::message::{SyncBody, SyncReply};
use crate::sync::transport::SyncTransport;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub struct BerkeleySync {
    local_id: String,
    transport: Arc<SyncTransport>,
    physical: Arc<PhysicalClock>,
    election: Arc<BullyElection>,
    time_diffs: RwLock<HashMap<String, i64>>,
    collecting: AtomicBool,
    collect_window: Duration,
}

impl BerkeleySync {
    pub fn new(
        local_id: impl Into<String>,
        transport: Arc<SyncTransport>,
        physical: Arc<PhysicalClock>,
        election: Arc<BullyElection>,
        collect_window: Duration,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            transport,
            physical,
            election,
            time_diffs: RwLock::new(HashMap::new()),
            collecting: AtomicBool::new(false),
            collect_window,
        }
    }

    /// Periodic sync tick. Rounds run only while this node is coordinator.
    pub fn spawn_sync_task(
        self: &Arc<Self>,
        interval: Duration,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let berkeley = Arc::clone(self);
        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                sleep(interval).await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if berkeley.election.is_coordinator() {
                    berkeley.run_round().await;
                }
            }
            tracing::debug!("clock sync task stopped");
        })
    }

    /// One full coordinator round.
    pub async fn run_round(&self) {
        {
            let mut diffs = self.time_diffs.write().unwrap();
            diffs.clear();
            diffs.insert(self.local_id.clone(), 0);
        }
        self.collecting.store(true, Ordering::SeqCst);

        self.transport.broadcast(SyncBody::TimeRequest {
            coordinator: self.local_id.clone(),
            timestamp: self.physical.now_millis(),
        });

        sleep(self.collect_window).await;
        self.collecting.store(false, Ordering::SeqCst);

        let diffs = self.time_diffs.read().unwrap().clone();
        let avg = average(&diffs);
        tracing::info!(
            "clock sync round: {} sample(s), average drift {} ms",
            diffs.len(),
            avg
        );

        self.physical.adjust(-avg);
        for (server_id, diff) in diffs {
            if server_id == self.local_id {
                continue;
            }
            self.transport.send(
                &server_id,
                SyncBody::ClockAdjustment {
                    coordinator: self.local_id.clone(),
                    adjustment: avg - diff,
                },
            );
        }
    }

    // Inbound handlers

    /// TIME_REQUEST from the coordinator: answer asynchronously with this
    /// node's difference against the coordinator's timestamp.
    pub fn handle_time_request(self: &Arc<Self>, coordinator: String, timestamp: i64) -> SyncReply {
        if self.election.is_coordinator() {
            // A coordinator does not report drift against another one.
            return SyncReply::ok_from(self.local_id.clone());
        }
        let now = self.physical.now_millis();
        let diff = now - timestamp;
        let berkeley = Arc::clone(self);
        tokio::spawn(async move {
            berkeley.transport.send(
                &coordinator,
                SyncBody::TimeResponse {
                    server_id: berkeley.local_id.clone(),
                    request_timestamp: timestamp,
                    response_timestamp: now,
                    time_difference: diff,
                },
            );
        });
        SyncReply::ok_from(self.local_id.clone())
    }

    pub fn handle_time_response(&self, server_id: String, time_difference: i64) -> SyncReply {
        if self.collecting.load(Ordering::SeqCst) {
            self.time_diffs
                .write()
                .unwrap()
                .insert(server_id, time_difference);
        } else {
            tracing::debug!("discarding late time response from {}", server_id);
        }
        SyncReply::ok_from(self.local_id.clone())
    }

    pub fn handle_clock_adjustment(&self, coordinator: String, adjustment: i64) -> SyncReply {
        tracing::debug!("clock adjustment of {} ms from {}", adjustment, coordinator);
        self.physical.adjust(adjustment);
        SyncReply::ok_from(self.local_id.clone())
    }

    #[cfg(test)]
    fn recorded_diffs(&self) -> HashMap<String, i64> {
        self.time_diffs.read().unwrap().clone()
    }
}

/// Mean of the recorded differences, rounded to the nearest millisecond.
fn average(diffs: &HashMap<String, i64>) -> i64 {
    if diffs.is_empty() {
        return 0;
    }
    let sum: i64 = diffs.values().sum();
    (sum as f64 / diffs.len() as f64).round() as i64
}
