// Three-backend replication scenarios
//
// Covers write propagation through the replication queue and applier, and
// the absence of retroactive delivery toward a node that was down when the
// write happened.

mod common;

use common::{backend_config, client_call, free_port, free_service_base, init_tracing, wait_until};
use flock::node::BackendNode;
use serde_json::json;
use std::time::Duration;

struct Cluster {
    nodes: Vec<BackendNode>,
    _data_root: tempfile::TempDir,
}

async fn start_cluster(ids: &[&str]) -> Cluster {
    init_tracing();
    let data_root = tempfile::tempdir().unwrap();
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

    // Let the discovery pings settle so every node sees every peer alive
    // before the scenarios start writing.
    let expected = ids.len() - 1;
    for node in &nodes {
        let ok = wait_until(Duration::from_secs(5), || async {
            node.context().peers.active_peers().len() >= expected
        })
        .await;
        assert!(ok, "{} never saw all peers", node.context().server_id);
    }

    Cluster {
        nodes,
        _data_root: data_root,
    }
}

async fn user_visible_on(node: &BackendNode, username: &str) -> bool {
    let reply = client_call(
        node.posts_port(),
        json!({ "action": "GET_USER_POSTS", "username": username }),
    )
    .await;
    reply["success"] == true
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn registration_propagates_to_every_backend() {
    let cluster = start_cluster(&["b1", "b2", "b3"]).await;

    let reply = client_call(
        cluster.nodes[0].users_port(),
        json!({ "action": "USER_REGISTER", "username": "alice", "password": "pw" }),
    )
    .await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["username"], "alice");

    // The user becomes visible on all three backends.
    for node in &cluster.nodes {
        let ok = wait_until(Duration::from_secs(2), || user_visible_on(node, "alice")).await;
        assert!(ok, "user did not reach {}", node.context().server_id);
    }

    for node in cluster.nodes {
        node.stop().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn post_lifecycle_propagates() {
    let cluster = start_cluster(&["b1", "b2", "b3"]).await;

    client_call(
        cluster.nodes[0].users_port(),
        json!({ "action": "USER_REGISTER", "username": "carol", "password": "pw" }),
    )
    .await;
    for node in &cluster.nodes {
        assert!(wait_until(Duration::from_secs(2), || user_visible_on(node, "carol")).await);
    }

    // Create on b2, observe everywhere.
    let reply = client_call(
        cluster.nodes[1].posts_port(),
        json!({ "action": "CREATE_POST", "username": "carol", "content": "hello cluster" }),
    )
    .await;
    assert_eq!(reply["success"], true);
    let post_id = reply["postId"].as_str().unwrap().to_string();

    for node in &cluster.nodes {
        let ok = wait_until(Duration::from_secs(2), || async {
            let reply = client_call(
                node.posts_port(),
                json!({ "action": "GET_USER_POSTS", "username": "carol" }),
            )
            .await;
            reply["count"] == 1
        })
        .await;
        assert!(ok, "post did not reach {}", node.context().server_id);
    }

    // Update on b3, delete on b1; the final state converges to empty.
    let reply = client_call(
        cluster.nodes[2].posts_port(),
        json!({ "action": "UPDATE_POST", "postId": post_id, "username": "carol", "content": "revised" }),
    )
    .await;
    assert_eq!(reply["success"], true);

    let ok = wait_until(Duration::from_secs(2), || async {
        let reply = client_call(
            cluster.nodes[0].posts_port(),
            json!({ "action": "GET_USER_POSTS", "username": "carol" }),
        )
        .await;
        reply["posts"][0]["content"] == "revised"
    })
    .await;
    assert!(ok, "update did not reach b1");

    let reply = client_call(
        cluster.nodes[0].posts_port(),
        json!({ "action": "DELETE_POST", "postId": post_id, "username": "carol" }),
    )
    .await;
    assert_eq!(reply["success"], true);

    for node in &cluster.nodes {
        let ok = wait_until(Duration::from_secs(2), || async {
            let reply = client_call(
                node.posts_port(),
                json!({ "action": "GET_USER_POSTS", "username": "carol" }),
            )
            .await;
            reply["count"] == 0
        })
        .await;
        assert!(ok, "delete did not reach {}", node.context().server_id);
    }

    for node in cluster.nodes {
        node.stop().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_retroactive_delivery_to_a_downed_node() {
    let mut cluster = start_cluster(&["b1", "b2", "b3"]).await;

    client_call(
        cluster.nodes[0].users_port(),
        json!({ "action": "USER_REGISTER", "username": "dave", "password": "pw" }),
    )
    .await;
    for node in &cluster.nodes {
        assert!(wait_until(Duration::from_secs(2), || user_visible_on(node, "dave")).await);
    }

    // Take b3 down, keeping a handle on its state.
    let b3 = cluster.nodes.pop().unwrap();
    let b3_ctx = std::sync::Arc::clone(b3.context());
    b3.stop().await;

    let reply = client_call(
        cluster.nodes[0].posts_port(),
        json!({ "action": "CREATE_POST", "username": "dave", "content": "while b3 is gone" }),
    )
    .await;
    assert_eq!(reply["success"], true);

    // b2 receives the post.
    let ok = wait_until(Duration::from_secs(2), || async {
        let reply = client_call(
            cluster.nodes[1].posts_port(),
            json!({ "action": "GET_USER_POSTS", "username": "dave" }),
        )
        .await;
        reply["count"] == 1
    })
    .await;
    assert!(ok, "post did not reach b2");

    // b3 never does: delivery is not retried after the fact.
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(b3_ctx.posts.len(), 0);

    for node in cluster.nodes {
        node.stop().await;
    }
}
