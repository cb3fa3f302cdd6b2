// Request router
//
// Per request: snapshot the live backends, pick one round-robin, compute
// the service port from the action, forward the untouched payload and
// relay the reply. An empty backend set or any forwarding failure becomes
// an error reply to the client; the router itself never drops a
// connection over a bad request.

use crate::balancer::registry::BackendRegistry;
use crate::error::{FlockError, Result};
use crate::service::request::action_port_offset;
use crate::sync::frame::{read_frame, write_frame};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const ACCEPT_POLL: Duration = Duration::from_millis(250);
const NO_BACKEND_ERROR: &str = "no server available";
const FORWARD_ERROR: &str = "communication error";

pub struct RequestRouter {
    listener: TcpListener,
    registry: Arc<BackendRegistry>,
    forward_timeout: Duration,
    port: u16,
}

impl RequestRouter {
    pub async fn bind(
        address: &str,
        port: u16,
        registry: Arc<BackendRegistry>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((address, port))
            .await
            .map_err(|e| FlockError::Network(format!("failed to bind router port {}: {}", port, e)))?;
        let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
        tracing::info!("request router listening on {}:{}", address, port);
        Ok(Self {
            listener,
            registry,
            forward_timeout: Duration::from_secs(5),
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn spawn(self, running: Arc<AtomicBool>) -> JoinHandle<()> {
        let listener = self.listener;
        let router = Arc::new(RouterInner {
            registry: self.registry,
            forward_timeout: self.forward_timeout,
        });
        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                match timeout(ACCEPT_POLL, listener.accept()).await {
                    Ok(Ok((stream, _))) => {
                        let router = Arc::clone(&router);
                        tokio::spawn(async move {
                            router.serve_client(stream).await;
                        });
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("router accept error: {}", e);
                    }
                    Err(_) => {
                        // Poll timeout: re-check the running flag.
                    }
                }
            }
            tracing::debug!("request router stopped");
        })
    }
}

struct RouterInner {
    registry: Arc<BackendRegistry>,
    forward_timeout: Duration,
}

impl RouterInner {
    async fn serve_client(&self, mut stream: TcpStream) {
        loop {
            let frame = match read_frame(&mut stream).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("client connection error: {}", e);
                    break;
                }
            };

            let reply = self.route(&frame).await;
            if let Err(e) = write_frame(&mut stream, &reply).await {
                tracing::debug!("failed to relay reply to client: {}", e);
                break;
            }
        }
    }

    /// Route one request payload and return the reply bytes.
    async fn route(&self, payload: &[u8]) -> Vec<u8> {
        let Some(backend) = self.registry.next_backend() else {
            tracing::warn!("no active backend for client request");
            return error_bytes(NO_BACKEND_ERROR);
        };

        // Only the action is inspected; the payload is forwarded untouched.
        let action = serde_json::from_slice::<Value>(payload)
            .ok()
            .and_then(|v| v.get("action").and_then(Value::as_str).map(String::from))
            .unwrap_or_default();
        let port = backend.service_port + action_port_offset(&action);
        let target = format!("{}:{}", backend.address, port);

        tracing::debug!("forwarding {} to {} at {}", action, backend.node_id, target);
        match self.forward(&target, payload).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("forward to {} failed: {}", target, e);
                error_bytes(FORWARD_ERROR)
            }
        }
    }

    async fn forward(&self, target: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let mut stream = timeout(self.forward_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| FlockError::Timeout(format!("connect to {}", target)))?
            .map_err(|e| FlockError::Network(e.to_string()))?;

        timeout(self.forward_timeout, write_frame(&mut stream, payload))
            .await
            .map_err(|_| FlockError::Timeout(format!("send to {}", target)))??;

        let reply = timeout(self.forward_timeout, read_frame(&mut stream))
            .await
            .map_err(|_| FlockError::Timeout(format!("reply from {}", target)))??
            .ok_or_else(|| FlockError::Network("backend closed without reply".to_string()))?;
        Ok(reply)
    }
}

fn error_bytes(message: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "success": false, "error": message }))
        .unwrap_or_else(|_| b"{\"success\":false}".to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::peer::{PeerEntry, PeerTable};

    fn inner_with_backend(service_port: u16) -> RouterInner {
        let peers = Arc::new(PeerTable::new("balancer"));
        let mut entry = PeerEntry::new("b1", "127.0.0.1", 6000);
        entry.service_port = service_port;
        peers.upsert(entry);
        RouterInner {
            registry: Arc::new(BackendRegistry::new(peers)),
            forward_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn test_no_backend_reply() {
        let inner = RouterInner {
            registry: Arc::new(BackendRegistry::new(Arc::new(PeerTable::new("balancer")))),
            forward_timeout: Duration::from_millis(500),
        };
        let reply = inner.route(br#"{"action":"GET_FEED","username":"a"}"#).await;
        let value: Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], NO_BACKEND_ERROR);
    }

    #[tokio::test]
    async fn test_forward_failure_reply() {
        // Backend registered at a port nothing listens on.
        let inner = inner_with_backend(1);
        let reply = inner.route(br#"{"action":"CREATE_POST"}"#).await;
        let value: Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], FORWARD_ERROR);
    }

    #[tokio::test]
    async fn test_demux_reaches_offset_port() {
        // A fake users service at base+300 echoes a marker.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let users_port = listener.local_addr().unwrap().port();
        let base_port = users_port - 300;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_frame(&mut stream).await.unwrap().unwrap();
            write_frame(&mut stream, br#"{"success":true,"port":"users"}"#)
                .await
                .unwrap();
        });

        let inner = inner_with_backend(base_port);
        let reply = inner
            .route(br#"{"action":"USER_REGISTER","username":"a","password":"p"}"#)
            .await;
        let value: Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["port"], "users");
    }
}
