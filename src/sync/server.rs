// Inbound control-plane endpoint
//
// One reply endpoint per node serves every sync message type. The bind
// retries base_port..base_port+4 with exponential backoff; exhausting the
// attempts is fatal for the node. Handlers never panic the receiver: every
// failure becomes an error reply and the loop keeps serving.

use crate::clock::LogicalClock;
use crate::error::{FlockError, Result};
use crate::sync::frame::{read_frame, write_frame};
use crate::sync::message::{SyncBody, SyncEnvelope, SyncReply};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const BIND_ATTEMPTS: u16 = 5;
const ACCEPT_POLL: Duration = Duration::from_millis(250);

// Seam between the shared receiver loop and the node role: backends install
// the full coordination responder, balancers a reduced one.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn handle(&self, body: SyncBody) -> SyncReply;
}

pub struct SyncServer {
    listener: TcpListener,
    port: u16,
}

impl SyncServer {
    /// Bind the sync endpoint, walking base_port..base_port+4 with
    /// exponential backoff between attempts.
    pub async fn bind(address: &str, base_port: u16) -> Result<Self> {
        let mut backoff = Duration::from_millis(100);
        let mut last_error = None;
        for attempt in 0..BIND_ATTEMPTS {
            let port = base_port + attempt;
            match TcpListener::bind((address, port)).await {
                Ok(listener) => {
                    let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
                    if attempt > 0 {
                        tracing::warn!(
                            "sync port {} was taken, bound {} instead",
                            base_port,
                            port
                        );
                    } else {
                        tracing::info!("sync endpoint listening on {}:{}", address, port);
                    }
                    return Ok(Self { listener, port });
                }
                Err(e) => {
                    tracing::warn!(
                        "failed to bind sync port {} (attempt {}/{}): {}",
                        port,
                        attempt + 1,
                        BIND_ATTEMPTS,
                        e
                    );
                    last_error = Some(e);
                    sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
        Err(FlockError::Network(format!(
            "could not bind sync port after {} attempts: {}",
            BIND_ATTEMPTS,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Port actually bound, which may differ from the configured base.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the receive loop until the running flag clears.
    pub fn spawn(
        self,
        clock: Arc<LogicalClock>,
        handler: Arc<dyn SyncHandler>,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                match timeout(ACCEPT_POLL, self.listener.accept()).await {
                    Ok(Ok((stream, _))) => {
                        let clock = Arc::clone(&clock);
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            handle_connection(stream, clock, handler).await;
                        });
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("sync accept error: {}", e);
                    }
                    Err(_) => {
                        // Poll timeout: re-check the running flag.
                    }
                }
            }
            tracing::debug!("sync receiver stopped");
        })
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    clock: Arc<LogicalClock>,
    handler: Arc<dyn SyncHandler>,
) {
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("sync connection error: {}", e);
                break;
            }
        };

        let mut reply = match serde_json::from_slice::<SyncEnvelope>(&frame) {
            Ok(envelope) => {
                // Merge the sender's clock before the action runs.
                if let Some(observed) = envelope.logical_time {
                    clock.merge(observed);
                }
                handler.handle(envelope.body).await
            }
            Err(e) => {
                tracing::warn!("undecodable sync message: {}", e);
                SyncReply::failure(format!("invalid sync message: {}", e))
            }
        };
        reply.logical_time = Some(clock.tick());

        let bytes = match serde_json::to_vec(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("failed to encode sync reply: {}", e);
                break;
            }
        };
        if let Err(e) = write_frame(&mut stream, &bytes).await {
            tracing::debug!("failed to write sync reply: {}", e);
            break;
        }
    }
}
