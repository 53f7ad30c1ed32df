//! Socket-level tests for the Ghost session layer
//!
//! Real TCP on loopback: SRP handshakes, encrypted frames, the
//! supervisor fleet with its dedup rule, and the health responder.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ghost_core::p2p::{
    authenticate_inbound, authenticate_outbound, health_listener, read_payload, write_payload,
    GhostMessage, NetConfig, Network,
};
use ghost_core::storage::PeerStore;

/// Poll until `check` passes or the deadline hits
async fn wait_for<F: Fn() -> bool>(check: F, what: &str) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn handshake_new_peer_derives_matching_keys() {
    let server_store = PeerStore::temporary().unwrap();
    let client_store = PeerStore::temporary().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_store_task = server_store.clone();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        authenticate_inbound(&mut socket, &server_store_task)
            .await
            .unwrap()
    });

    let mut client_socket = TcpStream::connect(addr).await.unwrap();
    let client_key = authenticate_outbound(&mut client_socket, &client_store, "server")
        .await
        .unwrap();
    let server_key = server.await.unwrap();

    // Both ends hold the same 32-byte session key
    assert_eq!(client_key, server_key);

    // The client persisted its credential, the server the verifier record
    let credential = client_store.get_credential("server").unwrap().unwrap();
    let record = server_store
        .get_record(&credential.identifier)
        .unwrap()
        .unwrap();
    assert!(!record.verifier.is_empty());
    assert_eq!(record.salt, credential.salt);
}

#[tokio::test]
async fn handshake_reconnect_uses_stored_record() {
    let server_store = PeerStore::temporary().unwrap();
    let client_store = PeerStore::temporary().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Serve two consecutive handshakes
    let server_store_task = server_store.clone();
    let server = tokio::spawn(async move {
        let mut keys = Vec::new();
        for _ in 0..2 {
            let (mut socket, _) = listener.accept().await.unwrap();
            keys.push(
                authenticate_inbound(&mut socket, &server_store_task)
                    .await
                    .unwrap(),
            );
        }
        keys
    });

    let mut first = TcpStream::connect(addr).await.unwrap();
    let first_key = authenticate_outbound(&mut first, &client_store, "server")
        .await
        .unwrap();
    drop(first);

    // Second contact: identifier-only challenge flow
    let mut second = TcpStream::connect(addr).await.unwrap();
    let second_key = authenticate_outbound(&mut second, &client_store, "server")
        .await
        .unwrap();

    let keys = server.await.unwrap();
    assert_eq!(keys[0], first_key);
    assert_eq!(keys[1], second_key);
    // Fresh ephemerals each session: the keys must differ
    assert_ne!(first_key, second_key);
}

#[tokio::test]
async fn unknown_peer_reconnect_is_rejected() {
    let server_store = PeerStore::temporary().unwrap();
    let client_store = PeerStore::temporary().unwrap();

    // Client believes it registered, server has no record
    let stale = ghost_core::p2p::OwnCredential::generate();
    client_store.put_credential("server", &stale).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        authenticate_inbound(&mut socket, &server_store).await
    });

    let mut client_socket = TcpStream::connect(addr).await.unwrap();
    let client_result =
        authenticate_outbound(&mut client_socket, &client_store, "server").await;

    assert!(client_result.is_err());
    assert!(server.await.unwrap().is_err());
}

#[tokio::test]
async fn sealed_frames_flow_after_handshake() {
    let server_store = PeerStore::temporary().unwrap();
    let client_store = PeerStore::temporary().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let key = authenticate_inbound(&mut socket, &server_store).await.unwrap();
        let payload = read_payload(&mut socket).await.unwrap();
        GhostMessage::open(&payload, &key).unwrap()
    });

    let mut client_socket = TcpStream::connect(addr).await.unwrap();
    let key = authenticate_outbound(&mut client_socket, &client_store, "server")
        .await
        .unwrap();

    let sent = GhostMessage::new("PING").with_int("NONCE", 99);
    write_payload(&mut client_socket, &sent.seal(&key).unwrap())
        .await
        .unwrap();

    assert_eq!(server.await.unwrap(), sent);
}

fn test_net_config() -> NetConfig {
    NetConfig {
        port: 0,
        max_bidirectional: 0,
        max_inbound: 4,
        seed_peers: vec![],
        startup_delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn fleet_answers_ping_and_tracks_session() {
    let peer_store = PeerStore::temporary().unwrap();
    let (network, _events) = Network::start(test_net_config(), peer_store)
        .await
        .unwrap();

    let port = network.local_addr().port();
    let client_store = PeerStore::temporary().unwrap();
    let mut socket = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let key = authenticate_outbound(&mut socket, &client_store, "node")
        .await
        .unwrap();

    wait_for(
        || network.connected_handlers().len() == 1,
        "handler registration",
    )
    .await;
    let peers = network.connected_handlers();
    assert_eq!(peers[0].peername, "127.0.0.1");

    // A PING frame comes back as PANG
    let ping = GhostMessage::new("PING");
    write_payload(&mut socket, &ping.seal(&key).unwrap())
        .await
        .unwrap();
    let reply = loop {
        let payload = read_payload(&mut socket).await.unwrap();
        let message = GhostMessage::open(&payload, &key).unwrap();
        // The handler pings on its own schedule too; skip those
        if message.msg_type != "PING" {
            break message;
        }
    };
    assert_eq!(reply.msg_type, "PANG");
}

#[tokio::test]
async fn duplicate_connection_from_same_ip_is_dropped() {
    let peer_store = PeerStore::temporary().unwrap();
    let (network, _events) = Network::start(test_net_config(), peer_store)
        .await
        .unwrap();
    let port = network.local_addr().port();

    // First session registers
    let first_store = PeerStore::temporary().unwrap();
    let mut first = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let _first_key = authenticate_outbound(&mut first, &first_store, "node")
        .await
        .unwrap();
    wait_for(
        || network.connected_handlers().len() == 1,
        "first registration",
    )
    .await;

    // Second session from the same IP completes its handshake but is
    // closed before it can register
    let second_store = PeerStore::temporary().unwrap();
    let mut second = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let _second_key = authenticate_outbound(&mut second, &second_store, "node")
        .await
        .unwrap();

    // The duplicate socket reaches EOF
    let mut probe = [0u8; 1];
    let closed = tokio::time::timeout(Duration::from_secs(5), second.read(&mut probe)).await;
    match closed {
        Ok(Ok(0)) => {}
        Ok(Ok(_)) => panic!("expected the duplicate socket to close"),
        Ok(Err(_)) => {}
        Err(_) => panic!("duplicate socket was not closed"),
    }

    assert_eq!(network.connected_handlers().len(), 1);
}

#[tokio::test]
async fn gossip_reaches_connected_peer() {
    let peer_store = PeerStore::temporary().unwrap();
    let (network, _events) = Network::start(test_net_config(), peer_store)
        .await
        .unwrap();
    let port = network.local_addr().port();

    let client_store = PeerStore::temporary().unwrap();
    let mut socket = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let key = authenticate_outbound(&mut socket, &client_store, "node")
        .await
        .unwrap();
    wait_for(|| network.connected_handlers().len() == 1, "registration").await;

    let broadcast = GhostMessage::new("BLOCK").with_str("DATA", "aGVsbG8=");
    network.gossip(broadcast.clone());

    let received = loop {
        let payload = read_payload(&mut socket).await.unwrap();
        let message = GhostMessage::open(&payload, &key).unwrap();
        if message.msg_type != "PING" {
            break message;
        }
    };
    assert_eq!(received, broadcast);

    // Directed send to a single handler
    let handler = network.connected_handlers()[0].handler;
    let direct = GhostMessage::new("BLOCK_QUERY").with_int("INDEX", 3);
    assert!(network.send_to(handler, direct.clone()).await);
    let received = loop {
        let payload = read_payload(&mut socket).await.unwrap();
        let message = GhostMessage::open(&payload, &key).unwrap();
        if message.msg_type != "PING" {
            break message;
        }
    };
    assert_eq!(received, direct);
}

#[tokio::test]
async fn handler_forwards_app_messages_to_router() {
    let peer_store = PeerStore::temporary().unwrap();
    let (network, mut events) = Network::start(test_net_config(), peer_store)
        .await
        .unwrap();
    let port = network.local_addr().port();

    let client_store = PeerStore::temporary().unwrap();
    let mut socket = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let key = authenticate_outbound(&mut socket, &client_store, "node")
        .await
        .unwrap();

    let sent = GhostMessage::new("TRANSACTION").with_str("DATA", "e30=");
    write_payload(&mut socket, &sent.seal(&key).unwrap())
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("router delivery")
        .expect("channel open");
    assert_eq!(event.message, sent);
}

#[tokio::test]
async fn bidirectional_handler_dials_seed_peer() {
    use ghost_core::p2p::HandlerRole;

    // Node B only listens
    let (node_b, _events_b) = Network::start(test_net_config(), PeerStore::temporary().unwrap())
        .await
        .unwrap();
    let seed = format!("127.0.0.1:{}", node_b.local_addr().port());

    // Node A's single handler is bidirectional and dials the seed
    let config_a = NetConfig {
        port: 0,
        max_bidirectional: 1,
        max_inbound: 1,
        seed_peers: vec![seed],
        startup_delay: Duration::from_millis(10),
    };
    let (node_a, _events_a) = Network::start(config_a, PeerStore::temporary().unwrap())
        .await
        .unwrap();

    wait_for(|| node_a.connected_handlers().len() == 1, "outbound session").await;
    wait_for(|| node_b.connected_handlers().len() == 1, "inbound session").await;

    let outbound = node_a.connected_handlers();
    assert_eq!(outbound[0].role, HandlerRole::Bidirectional);
    assert_eq!(outbound[0].peername, "127.0.0.1");
}

#[tokio::test]
async fn health_probe_roundtrip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(health_listener(listener));

    // Probes are served one at a time, each on a fresh accept
    for _ in 0..3 {
        let mut probe = TcpStream::connect(addr).await.unwrap();
        probe.write_all(&[0x00]).await.unwrap();
        let mut reply = [0u8; 1];
        probe.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[0], 0x01);
        // Server closes after answering
        let mut rest = [0u8; 1];
        assert_eq!(probe.read(&mut rest).await.unwrap(), 0);
    }
}
