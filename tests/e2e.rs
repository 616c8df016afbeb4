//! Black-box scenarios against a real master HTTP server, a real
//! `FileStore`/`Serializer` pair under a `tempfile::tempdir()`, and the
//! node's own typed HTTP client -- no Docker daemon involved, since the
//! allocator/heartbeat/store loop is testable without one.

use std::{net::TcpListener, sync::Arc};

use flotilla::{
    allocator,
    model::{Definition, Node, NodeInfo, NodeInfoResponse},
    node_client::MasterClient,
    serializer::Serializer,
    store::{FileStore, Store},
};

/// Bind an ephemeral port, hand it to `master_api::serve`, and return the
/// address plus a shutdown handle.
async fn spawn_master(serializer: Arc<Serializer>) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let _ = flotilla::master_api::serve_listener(listener, serializer, async { rx.await.ok(); }).await;
    });

    (addr, tx)
}

#[tokio::test]
async fn s1_single_replica_on_single_node_converges_and_reports_running() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store
        .save_definition(&Definition { name: "web".into(), image: "nginx".into(), count: 1, http_port: Some(80), ..Default::default() })
        .unwrap();

    let serializer = Arc::new(Serializer::new(store));
    let (addr, shutdown) = spawn_master(serializer.clone()).await;

    // Tick 1: no nodes known yet; allocator should skip creation.
    serializer
        .run({
            let mut rng = allocator::new_rng();
            move |s| allocator::tick(s, &mut rng)
        })
        .unwrap();

    let client = MasterClient::new(&addr.to_string());
    let hb = NodeInfo { node: Node { name: "n1".into(), addr: "10.0.0.1:9000".into(), enabled: true, last_updated: None }, containers: vec![] };
    let resp: NodeInfoResponse = client.ping_node_info(&hb).await.unwrap();
    assert!(resp.containers.is_empty(), "n1 shouldn't be assigned anything before the allocator has seen it");

    // Tick 2: n1 is now known (the heartbeat registered it); allocator assigns web-1.
    serializer
        .run({
            let mut rng = allocator::new_rng();
            move |s| allocator::tick(s, &mut rng)
        })
        .unwrap();

    let resp: NodeInfoResponse = client.ping_node_info(&hb).await.unwrap();
    assert_eq!(resp.containers.len(), 1);
    let web1 = &resp.containers[0];
    assert_eq!(web1.name, "web-1");
    assert_eq!(web1.node_name, "n1");
    assert_eq!(web1.node_http_port, Some(11000));
    assert!(!web1.running);

    // The node observed web-1 running after a successful local start; its
    // next heartbeat reports that back, and the master persists it.
    let observed = NodeInfo {
        node: hb.node.clone(),
        containers: vec![flotilla::model::Container { container_id: "abc123".into(), running: true, ..web1.clone() }],
    };
    client.ping_node_info(&observed).await.unwrap();

    let conts = serializer.run(|s| s.list_containers().unwrap()).unwrap();
    let stored = conts.get("web-1").unwrap();
    assert!(stored.running);
    assert_eq!(stored.container_id, "abc123");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn s3_balanced_placement_across_two_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.save_node(&Node { name: "n1".into(), addr: "a".into(), enabled: true, last_updated: None }).unwrap();
    store.save_node(&Node { name: "n2".into(), addr: "b".into(), enabled: true, last_updated: None }).unwrap();
    store
        .save_definition(&Definition { name: "web".into(), image: "nginx".into(), count: 4, ..Default::default() })
        .unwrap();

    let serializer = Arc::new(Serializer::new(store));
    serializer
        .run({
            let mut rng = allocator::new_rng();
            move |s| allocator::tick(s, &mut rng)
        })
        .unwrap();

    let conts = serializer.run(|s| s.list_containers().unwrap()).unwrap();
    let n1 = conts.values().filter(|c| c.node_name == "n1").count();
    let n2 = conts.values().filter(|c| c.node_name == "n2").count();
    assert_eq!(n1, 2);
    assert_eq!(n2, 2);
}

#[tokio::test]
async fn get_definition_endpoint_round_trips_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store
        .save_definition(&Definition { name: "web".into(), image: "nginx:1.25".into(), count: 2, http_port: Some(80), ..Default::default() })
        .unwrap();
    let serializer = Arc::new(Serializer::new(store));
    let (addr, shutdown) = spawn_master(serializer).await;

    let client = MasterClient::new(&addr.to_string());
    let def = client.get_definition("web").await.unwrap().expect("definition should exist");
    assert_eq!(def.image, "nginx:1.25");
    assert_eq!(def.count, 2);

    assert!(client.get_definition("does-not-exist").await.unwrap().is_none());

    let _ = shutdown.send(());
}
