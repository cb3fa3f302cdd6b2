// Shared harness for multi-node integration tests
//
// Nodes run in-process on loopback ports with shortened intervals so the
// scenarios settle in seconds. Assertions poll with a deadline instead of
// sleeping fixed amounts.

#![allow(dead_code)]

use flock::config::{NodeConfig, SeedServer};
use flock::sync::frame::{read_frame, write_frame};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// A port the OS considers free right now.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A base port whose +100/+200/+300 offsets are also bindable, for the four
/// service listeners of one backend.
pub fn free_service_base() -> u16 {
    for _ in 0..64 {
        let base = free_port();
        if base < 2000 || base > 60000 {
            continue;
        }
        let all_free = [100u16, 200, 300].iter().all(|offset| {
            std::net::TcpListener::bind(("127.0.0.1", base + offset)).is_ok()
        });
        if all_free {
            return base;
        }
    }
    panic!("could not find a free service port block");
}

/// Backend configuration with intervals shortened for tests.
pub fn backend_config(
    id: &str,
    sync_port: u16,
    base_port: u16,
    seeds: &[(String, u16)],
    data_root: &Path,
) -> NodeConfig {
    NodeConfig {
        server_id: id.to_string(),
        server_address: "127.0.0.1".to_string(),
        server_port: base_port,
        sync_port,
        seed_servers: seeds
            .iter()
            .map(|(node_id, port)| SeedServer {
                node_id: node_id.clone(),
                host: "127.0.0.1".to_string(),
                sync_port: *port,
            })
            .collect(),
        data_directory: data_root.join(id),
        ping_interval: Duration::from_millis(500),
        announce_delay: Duration::from_millis(200),
        election_response_window: Duration::from_millis(400),
        berkeley_collect_window: Duration::from_millis(300),
        coordinator_check_interval: Duration::from_millis(800),
        // Keep clock-sync rounds out of the way unless a test wants them.
        sync_interval: Duration::from_secs(3600),
        retry_suppression_window: Duration::from_millis(500),
        send_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_millis(500),
        replication_idle_sleep: Duration::from_millis(20),
        ..NodeConfig::default()
    }
}

pub fn balancer_config(
    id: &str,
    sync_port: u16,
    router_port: u16,
    seeds: &[(String, u16)],
    data_root: &Path,
) -> NodeConfig {
    let mut config = backend_config(id, sync_port, 0, seeds, data_root);
    config.is_balancer = true;
    config.balancer_port = router_port;
    config
}

/// One framed request/reply round trip against a service or router port.
pub async fn client_call(port: u16, payload: Value) -> Value {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect to service port");
    let bytes = serde_json::to_vec(&payload).unwrap();
    write_frame(&mut stream, &bytes).await.expect("send request");
    let frame = read_frame(&mut stream)
        .await
        .expect("read reply")
        .expect("reply frame");
    serde_json::from_slice(&frame).expect("reply is JSON")
}

/// Poll an async condition until it holds or the deadline passes.
pub async fn wait_until<F, Fut>(deadline: Duration, condition: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
