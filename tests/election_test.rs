// Coordinator election scenarios
//
// The highest-id backend wins the steady-state election; killing it makes
// the next-highest take over within a check interval plus the response
// window.

mod common;

use common::{backend_config, free_port, free_service_base, init_tracing, wait_until};
use flock::node::BackendNode;
use std::time::Duration;

async fn start_three() -> (Vec<BackendNode>, tempfile::TempDir) {
    init_tracing();
    let data_root = tempfile::tempdir().unwrap();
    let ids = ["b1", "b2", "b3"];
    let sync_ports: Vec<u16> = ids.iter().map(|_| free_port()).collect();
    let seeds: Vec<(String, u16)> = ids
        .iter()
        .zip(&sync_ports)
        .map(|(id, port)| (id.to_string(), *port))
        .collect();

    let mut nodes = Vec::new();
    for (id, sync_port) in ids.iter().zip(&sync_ports) {
        let config = backend_config(id, *sync_port, free_service_base(), &seeds, data_root.path());
        nodes.push(BackendNode::start(config).await.expect("start backend"));
    }

    for node in &nodes {
        let ok = wait_until(Duration::from_secs(5), || async {
            node.context().peers.active_peers().len() >= 2
        })
        .await;
        assert!(ok, "{} never saw all peers", node.context().server_id);
    }

    (nodes, data_root)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn highest_id_becomes_coordinator_and_failover_elects_next() {
    let (mut nodes, _data_root) = start_three().await;

    // b3 wins the first stable round and the others learn about it.
    let ok = wait_until(Duration::from_secs(10), || async {
        nodes[2].election().is_coordinator()
            && !nodes[0].election().is_coordinator()
            && !nodes[1].election().is_coordinator()
    })
    .await;
    assert!(ok, "b3 never became coordinator");

    let ok = wait_until(Duration::from_secs(10), || async {
        nodes[0].election().coordinator().as_deref() == Some("b3")
            && nodes[1].election().coordinator().as_deref() == Some("b3")
    })
    .await;
    assert!(ok, "peers never recorded b3 as coordinator");

    // Kill b3; b2 must take over.
    let b3 = nodes.pop().unwrap();
    b3.stop().await;

    let ok = wait_until(Duration::from_secs(15), || async {
        nodes[1].election().is_coordinator()
    })
    .await;
    assert!(ok, "b2 did not take over after b3 went down");

    let ok = wait_until(Duration::from_secs(10), || async {
        nodes[0].election().coordinator().as_deref() == Some("b2")
            && !nodes[0].election().is_coordinator()
    })
    .await;
    assert!(ok, "b1 never recorded the new coordinator");

    for node in nodes {
        node.stop().await;
    }
}
