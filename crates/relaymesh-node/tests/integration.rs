//! Integration tests for RelayNode
//!
//! API behaviour is checked in-process through the router with a recording
//! transport; relaying and bootstrap are checked end to end between nodes
//! serving real HTTP on loopback ports.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine as _;
use http_body_util::BodyExt;
use relaymesh_core::{MockTransport, Relayable, StaticHardwareId};
use relaymesh_node::{NodeConfig, NodeError, RelayNode};
use relaymesh_routing::Delivery;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;

/// A node over the recording transport, never bound to a socket
fn mock_node(name: &str) -> (RelayNode<MockTransport>, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let config = NodeConfig::default()
        .with_name(name)
        .with_address(format!("http://{name}:8080"));
    let node = RelayNode::with_transport(
        config,
        &StaticHardwareId(format!("hw-{name}")),
        Arc::clone(&transport),
    )
    .unwrap();
    (node, transport)
}

async fn post(node: &RelayNode<MockTransport>, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    send(node, request).await
}

async fn get(node: &RelayNode<MockTransport>, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(node, request).await
}

async fn send(node: &RelayNode<MockTransport>, request: Request<Body>) -> (StatusCode, Value) {
    let response = node.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn peer_json(id: &str, address: &str) -> String {
    json!({
        "unique_id": id,
        "peer_name": id,
        "exposed": true,
        "address": address,
        "public_key": "opaque",
        "ttl": 8,
    })
    .to_string()
}

fn offer_json(source: &str, destination: &str, sdp: &str, ttl: i64) -> String {
    json!({
        "source_id": source,
        "destination_id": destination,
        "turn_server": "turn:turn.example.org",
        "sdp_offer": sdp,
        "ttl": ttl,
    })
    .to_string()
}

#[tokio::test]
async fn test_register_and_list_last_write_wins() {
    let (node, _) = mock_node("a");

    let (status, body) = post(&node, "/api/v1/peer", peer_json("p1", "http://10.0.0.5:8080")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
    post(&node, "/api/v1/peer", peer_json("p1", "http://10.0.0.6:8080")).await;

    let (status, body) = get(&node, "/api/v1/peers").await;
    assert_eq!(status, StatusCode::OK);
    let peers = body["peers"].as_array().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0]["unique_id"], "p1");
    assert_eq!(peers[0]["address"], "http://10.0.0.6:8080");
}

#[tokio::test]
async fn test_epoch_created_accepted() {
    let (node, _) = mock_node("a");
    let me = node.id().to_string();

    let mut peer: Value = serde_json::from_str(&peer_json("p1", "http://10.0.0.5:8080")).unwrap();
    peer["created"] = json!(1700000000.5);
    let (status, _) = post(&node, "/api/v1/peer", peer.to_string()).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&node, "/api/v1/peers").await;
    assert_eq!(body["peers"][0]["created"], "2023-11-14T22:13:20.500Z");

    let mut offer: Value = serde_json::from_str(&offer_json("caller", &me, "v=0", 2)).unwrap();
    offer["created"] = json!(1700000000);
    let (status, _) = post(&node, "/api/v1/offer", offer.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        node.offers().get(&"caller".into()).unwrap().created_at.timestamp(),
        1_700_000_000
    );
}

#[tokio::test]
async fn test_malformed_requests_rejected() {
    let (node, transport) = mock_node("a");

    let (status, body) = post(&node, "/api/v1/peer", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // Missing address
    let missing = json!({"unique_id": "p1", "peer_name": "p1", "exposed": true, "public_key": "", "ttl": 1});
    let (status, _) = post(&node, "/api/v1/peer", missing.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&node, "/api/v1/peer", peer_json("", "http://10.0.0.5:8080")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_payload = json!({
        "source_id": "x",
        "destination_id": "y",
        "protocol": "chat",
        "payload": "%%% not base64 %%%",
        "ttl": 3,
    });
    let (status, _) = post(&node, "/api/v1/packet_send", bad_payload.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&node, "/api/v1/offer", offer_json("", "y", "sdp", 3)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(node.registry().is_empty());
    assert!(node.offers().is_empty());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(transport.sent().await.is_empty());
}

#[tokio::test]
async fn test_offer_delivered_and_retrievable() {
    let (node, transport) = mock_node("a");
    let me = node.id().to_string();
    let mut deliveries = node.subscribe();

    let (status, _) = post(&node, "/api/v1/offer", offer_json("caller", &me, "v=0 first", 3)).await;
    assert_eq!(status, StatusCode::OK);
    post(&node, "/api/v1/offer", offer_json("caller", &me, "v=0 second", 3)).await;

    let (status, body) = get(&node, "/api/v1/offers/caller").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sdp_offer"], "v=0 second");
    assert_eq!(node.offers().len(), 1);

    assert!(matches!(deliveries.try_recv(), Ok(Delivery::Offer(_))));

    let (status, body) = get(&node, "/api/v1/offers/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    // Delivered locally, never forwarded
    assert!(transport.sent().await.is_empty());
}

#[tokio::test]
async fn test_expired_envelope_is_a_no_op() {
    let (node, transport) = mock_node("a");
    post(&node, "/api/v1/peer", peer_json("p1", "http://p1:8080")).await;
    let me = node.id().to_string();

    let (status, _) = post(&node, "/api/v1/offer", offer_json("caller", &me, "sdp", 0)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&node, "/api/v1/offer", offer_json("caller", "elsewhere", "sdp", -2)).await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(node.offers().is_empty());
    assert!(transport.sent().await.is_empty());
    assert_eq!(node.registry().len(), 1);
}

#[tokio::test]
async fn test_packet_forwarded_with_decremented_ttl() {
    let (node, transport) = mock_node("a");
    post(&node, "/api/v1/peer", peer_json("p1", "http://p1:8080/")).await;
    post(&node, "/api/v1/peer", peer_json("p2", "http://p2:8080")).await;

    let packet = json!({
        "source_id": "x",
        "destination_id": "z",
        "protocol": "chat",
        "payload": base64::engine::general_purpose::STANDARD.encode(b"hi"),
        "ttl": 5,
    });
    let (status, _) = post(&node, "/api/v1/packet_send", packet.to_string()).await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(50)).await;
    for address in ["http://p1:8080", "http://p2:8080"] {
        let sent = transport.sent_to(address).await;
        assert_eq!(sent.len(), 1, "one copy to {address}");
        assert_eq!(sent[0].ttl(), 4);
    }
}

#[tokio::test]
async fn test_node_info_and_health() {
    let (node, _) = mock_node("a");

    let (status, _) = get(&node, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&node, "/api/v1/node").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unique_id"], node.id().as_str());
    assert_eq!(body["peer_name"], "a");
    assert_eq!(body["address"], "http://a:8080");
}

#[tokio::test]
async fn test_identity_failure_is_an_error() {
    let result = RelayNode::with_transport(
        NodeConfig::default().with_address("http://a:8080"),
        &StaticHardwareId(String::new()),
        Arc::new(MockTransport::new()),
    );
    assert!(matches!(result, Err(NodeError::Identity(_))));
}

#[tokio::test]
async fn test_zero_default_ttl_rejected() {
    let result = RelayNode::with_transport(
        NodeConfig::default().with_default_ttl(0),
        &StaticHardwareId("hw".to_string()),
        Arc::new(MockTransport::new()),
    );
    assert!(matches!(result, Err(NodeError::Config(_))));
}

#[test]
fn test_identity_stable_across_restarts() {
    let first = mock_node("a").0.id().clone();
    let second = mock_node("a").0.id().clone();
    let other = mock_node("b").0.id().clone();
    assert_eq!(first, second);
    assert_ne!(first, other);
}

/// Start a node serving HTTP on an ephemeral loopback port
async fn spawn_node(name: &str, seeds: Vec<String>) -> Arc<RelayNode> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    let config = NodeConfig::default()
        .with_name(name)
        .with_address(address)
        .with_hardware_id(format!("hw-{name}"))
        .with_seeds(seeds)
        .with_send_timeout(Duration::from_secs(2));

    let node = Arc::new(RelayNode::new(config).unwrap());
    let server = Arc::clone(&node);
    tokio::spawn(async move { server.serve(listener).await });
    node
}

/// An address nothing listens on
async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    address
}

#[tokio::test]
async fn test_bootstrap_with_unreachable_seed() {
    let seed = spawn_node("seed", vec![]).await;
    let dead = dead_address().await;
    let node = spawn_node("joiner", vec![dead.clone(), seed.local_record().address.clone()]).await;

    let report = node.bootstrap().await;

    assert_eq!(report.registered, vec![seed.local_record().address.clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, dead);
    assert!(seed.registry().contains(node.id()));
    // Push-only: we learned nothing
    assert!(node.registry().is_empty());
}

#[tokio::test]
async fn test_bootstrap_pull_peers() {
    let seed = spawn_node("seed", vec![]).await;
    let other = spawn_node("other", vec![]).await;
    seed.registry().register(other.local_record().clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = NodeConfig::default()
        .with_name("puller")
        .with_address(format!("http://{}", listener.local_addr().unwrap()))
        .with_hardware_id("hw-puller")
        .with_seeds(vec![seed.local_record().address.clone()])
        .with_pull_peers(true);
    let node = RelayNode::new(config).unwrap();

    let report = node.bootstrap().await;
    // The seed lists "other" and ourselves; only "other" is imported
    assert_eq!(report.imported, 1);
    assert!(node.registry().contains(other.id()));
    assert!(!node.registry().contains(node.id()));
}

#[tokio::test]
async fn test_end_to_end_relay() {
    let b = spawn_node("b", vec![]).await;
    let a = spawn_node("a", vec![b.local_record().address.clone()]).await;
    let c = spawn_node("c", vec![b.local_record().address.clone()]).await;
    let mut c_deliveries = c.subscribe();

    a.bootstrap().await;
    c.bootstrap().await;
    assert_eq!(b.registry().len(), 2);

    // A needs a route out; bootstrap is push-only
    a.registry().register(b.local_record().clone());

    let disposition = a.send_packet(c.id().clone(), "chat", b"hello".to_vec());
    let report = disposition.into_fanout().unwrap().await;
    assert_eq!(report.delivered, vec![b.id().clone()]);

    let delivery = tokio::time::timeout(Duration::from_secs(5), c_deliveries.recv())
        .await
        .expect("c should receive the packet")
        .unwrap();
    match delivery {
        Delivery::Packet(packet) => {
            assert_eq!(packet.payload, b"hello");
            assert_eq!(packet.source_id, *a.id());
            assert_eq!(packet.ttl, 7);
        }
        other => panic!("Expected packet, got {:?}", other),
    }
}

#[tokio::test]
async fn test_end_to_end_offer_and_answer() {
    let a = spawn_node("a", vec![]).await;
    let b = spawn_node("b", vec![]).await;
    a.registry().register(b.local_record().clone());
    b.registry().register(a.local_record().clone());
    let mut a_deliveries = a.subscribe();

    a.send_offer(b.id().clone(), "turn:t", "v=0 offer").into_fanout().unwrap().await;
    let offer = b.offers().get(a.id()).expect("b stores a's offer");
    assert_eq!(offer.sdp_offer, "v=0 offer");

    b.send_response(a.id().clone(), "turn:t", "v=0 answer").into_fanout().unwrap().await;
    let delivery = tokio::time::timeout(Duration::from_secs(5), a_deliveries.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(delivery, Delivery::Answer(answer) if answer.sdp_answer == "v=0 answer"));
}
