// Generic service worker
//
// One worker per service port. The worker owns the listener, parses each
// request frame, checks that its handler claims the action and invokes it.
// Every failure path becomes a `{success:false, error}` reply; nothing
// escapes as a broken connection or a panic.

use crate::error::{FlockError, Result};
use crate::service::request::{error_reply, ClientRequest};
use crate::sync::frame::{read_frame, write_frame};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const ACCEPT_POLL: Duration = Duration::from_millis(250);

// Capability seam: a handler names the actions it serves and dispatches
// decoded requests.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn handles(&self, action: &str) -> bool;
    async fn dispatch(&self, request: ClientRequest) -> Value;
}

pub struct ServiceWorker {
    listener: TcpListener,
    handler: Arc<dyn ActionHandler>,
    port: u16,
}

impl ServiceWorker {
    pub async fn bind(
        address: &str,
        port: u16,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((address, port))
            .await
            .map_err(|e| FlockError::Network(format!("failed to bind service port {}: {}", port, e)))?;
        let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
        tracing::info!("{} service listening on {}:{}", handler.name(), address, port);
        Ok(Self {
            listener,
            handler,
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn spawn(self, running: Arc<AtomicBool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                match timeout(ACCEPT_POLL, self.listener.accept()).await {
                    Ok(Ok((stream, _))) => {
                        let handler = Arc::clone(&self.handler);
                        tokio::spawn(async move {
                            serve_connection(stream, handler).await;
                        });
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("service accept error: {}", e);
                    }
                    Err(_) => {
                        // Poll timeout: re-check the running flag.
                    }
                }
            }
            tracing::debug!("service worker stopped");
        })
    }
}

async fn serve_connection(mut stream: TcpStream, handler: Arc<dyn ActionHandler>) {
    loop {
        let frame = match read_frame(&mut stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("service connection error: {}", e);
                break;
            }
        };

        let reply = process_frame(&frame, handler.as_ref()).await;
        let bytes = match serde_json::to_vec(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("failed to encode service reply: {}", e);
                break;
            }
        };
        if let Err(e) = write_frame(&mut stream, &bytes).await {
            tracing::debug!("failed to write service reply: {}", e);
            break;
        }
    }
}

async fn process_frame(frame: &[u8], handler: &dyn ActionHandler) -> Value {
    let value: Value = match serde_json::from_slice(frame) {
        Ok(value) => value,
        Err(e) => return error_reply(format!("invalid request: {}", e)),
    };
    let Some(action) = value.get("action").and_then(Value::as_str) else {
        return error_reply("missing action field");
    };
    if !handler.handles(action) {
        return error_reply(format!("unknown action '{}'", action));
    }
    match serde_json::from_value::<ClientRequest>(value.clone()) {
        Ok(request) => handler.dispatch(request).await,
        Err(e) => error_reply(format!("invalid request: {}", e)),
    }
}
