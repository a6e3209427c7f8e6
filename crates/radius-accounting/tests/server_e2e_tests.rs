//! UDP end-to-end tests for the accounting server
//!
//! Each test binds a server to an OS-assigned port on 127.0.0.1 and talks
//! to it with real Accounting-Request datagrams.

use radius_accounting::{
    AccountingOptions, AccountingServer, AccountingService, AccountingStore, Client, Config, MemoryStore, ServerConfig,
};
use radius_proto::auth::{
    calculate_accounting_request_authenticator, generate_request_authenticator, verify_response_authenticator,
};
use radius_proto::{Attribute, AttributeType, Code, Packet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

const SECRET: &str = "testing123";

fn build_request(identifier: u8, status: u32, session_id: &str, extra: Vec<Attribute>) -> Packet {
    let mut packet = Packet::new(Code::AccountingRequest, identifier, [0u8; 16]);
    packet.add_attribute(
        Attribute::integer(AttributeType::AcctStatusType as u8, status).expect("Failed to create Acct-Status-Type"),
    );
    packet.add_attribute(
        Attribute::string(AttributeType::AcctSessionId as u8, session_id).expect("Failed to create Acct-Session-Id"),
    );
    for attr in extra {
        packet.add_attribute(attr);
    }
    packet.authenticator =
        calculate_accounting_request_authenticator(&packet, SECRET.as_bytes()).expect("Failed to sign request");
    packet
}

fn user_name(name: &str) -> Attribute {
    Attribute::string(AttributeType::UserName as u8, name).expect("Failed to create User-Name")
}

async fn start_server(store: Arc<MemoryStore>) -> SocketAddr {
    let mut config = Config::default();
    config.listen_address = "127.0.0.1".to_string();
    config.listen_port = 0;
    config.secret = SECRET.to_string();
    config.clients = vec![Client {
        address: "127.0.0.1".to_string(),
        secret: SECRET.to_string(),
        name: Some("loopback-nas".to_string()),
        enabled: true,
    }];

    let service = AccountingService::new(store, AccountingOptions::default());
    let server_config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), config);
    let server = AccountingServer::new(server_config, service)
        .await
        .expect("Failed to create server");
    let addr = server.local_addr().expect("Failed to get server address");

    tokio::spawn(async move {
        server.run().await.expect("Server failed");
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

/// Send raw bytes and wait for a reply, `None` on timeout
async fn exchange(socket: &UdpSocket, server: SocketAddr, data: &[u8], wait: Duration) -> Option<Vec<u8>> {
    socket.send_to(data, server).await.expect("Failed to send request");
    let mut buf = vec![0u8; 4096];
    match tokio::time::timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        Ok(Err(e)) => panic!("Failed to receive response: {}", e),
        Err(_) => None,
    }
}

#[tokio::test]
async fn test_start_is_acknowledged() {
    let store = Arc::new(MemoryStore::new());
    let server = start_server(store.clone()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let request = build_request(7, 1, "e2e-1", vec![user_name("alice")]);
    let reply = exchange(&client, server, &request.encode().unwrap(), Duration::from_secs(5))
        .await
        .expect("No Accounting-Response received");

    let response = Packet::decode(&reply).unwrap();
    assert_eq!(response.code, Code::AccountingResponse);
    assert_eq!(response.identifier, 7);
    assert!(verify_response_authenticator(&response, &request.authenticator, SECRET.as_bytes()));

    let session = store.get_session("e2e-1").await.unwrap();
    assert_eq!(session.and_then(|s| s.user_name).as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_proxy_state_is_echoed() {
    let store = Arc::new(MemoryStore::new());
    let server = start_server(store).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let proxy_state = Attribute::new(AttributeType::ProxyState as u8, b"hop-1".to_vec()).unwrap();
    let request = build_request(8, 1, "e2e-proxy", vec![proxy_state]);
    let reply = exchange(&client, server, &request.encode().unwrap(), Duration::from_secs(5))
        .await
        .expect("No Accounting-Response received");

    let response = Packet::decode(&reply).unwrap();
    let echoed = response
        .find_attribute(AttributeType::ProxyState as u8)
        .expect("Proxy-State not echoed");
    assert_eq!(echoed.value, b"hop-1");
}

#[tokio::test]
async fn test_bad_authenticator_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    let server = start_server(store.clone()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut request = build_request(9, 1, "forged", vec![user_name("mallory")]);
    request.authenticator = generate_request_authenticator();

    let reply = exchange(&client, server, &request.encode().unwrap(), Duration::from_millis(500)).await;
    assert!(reply.is_none());
    assert!(store.get_session("forged").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_session_stop_is_not_acknowledged() {
    let store = Arc::new(MemoryStore::new());
    let server = start_server(store).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let request = build_request(10, 2, "never-started", vec![]);
    let reply = exchange(&client, server, &request.encode().unwrap(), Duration::from_millis(500)).await;
    assert!(reply.is_none());
}

#[tokio::test]
async fn test_retransmission_replays_reply() {
    let store = Arc::new(MemoryStore::new());
    let server = start_server(store.clone()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let start = build_request(11, 1, "e2e-retx", vec![user_name("alice")]);
    exchange(&client, server, &start.encode().unwrap(), Duration::from_secs(5))
        .await
        .expect("Start not acknowledged");

    let stop = build_request(
        12,
        2,
        "e2e-retx",
        vec![Attribute::integer(AttributeType::AcctInputOctets as u8, 4096).unwrap()],
    )
    .encode()
    .unwrap();
    let first = exchange(&client, server, &stop, Duration::from_secs(5))
        .await
        .expect("Stop not acknowledged");
    let second = exchange(&client, server, &stop, Duration::from_secs(5))
        .await
        .expect("Retransmitted Stop not acknowledged");

    assert_eq!(first, second);
    let logs = store.usage_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].total_upstream_bytes, 4096);
}
