mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use switchboard::bridge::{Bridge, BridgeConfig, BridgeState, BRIDGE_PATH};
use switchboard::server::ListenerStats;
use switchboard::session::SessionStore;
use switchboard::shutdown::Shutdown;

use common::start_server;

async fn start_bridge(
    upstream: SocketAddr,
    sessions: Arc<SessionStore>,
    stats: Arc<ListenerStats>,
) -> (SocketAddr, Shutdown) {
    let state = BridgeState::new(
        BridgeConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            upstream,
        },
        sessions,
        stats,
        2,
    );
    let bridge = Bridge::bind(state).await.unwrap();
    let addr = bridge.local_addr().unwrap();
    let shutdown = Shutdown::new();
    tokio::spawn(bridge.run(shutdown.signal()));
    (addr, shutdown)
}

async fn tcp_exchange(addr: SocketAddr, line: &str) -> String {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(format!("{}\n", line).as_bytes()).await.unwrap();
    let mut reply = String::new();
    BufReader::new(read_half).read_line(&mut reply).await.unwrap();
    reply.trim_end_matches('\n').to_string()
}

#[tokio::test]
async fn bridged_reply_matches_direct_reply_byte_for_byte() {
    let server = start_server(4, vec![]).await;
    let (bridge_addr, bridge_shutdown) =
        start_bridge(server.addr, Arc::clone(&server.sessions), Arc::clone(&server.stats)).await;

    let request = r#"{"type":"AUTH","data":{"action":"LOGIN","email":"nobody@example.com","password":"pw"},"requestId":"1"}"#;
    let direct = tcp_exchange(server.addr, request).await;

    let url = format!("ws://{}{}", bridge_addr, BRIDGE_PATH);
    let (mut ws, _) = connect_async(url).await.unwrap();
    ws.send(Message::Text(request.to_string())).await.unwrap();

    let bridged = match tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap()
    {
        Message::Text(text) => text,
        other => panic!("expected text frame, got {:?}", other),
    };
    assert_eq!(bridged, direct);
    assert!(bridged.contains(r#""success":false"#));

    ws.close(None).await.unwrap();
    bridge_shutdown.trigger();
    server.stop().await;
}

#[tokio::test]
async fn unreachable_upstream_closes_browser_with_server_error() {
    let dead = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let (bridge_addr, bridge_shutdown) = start_bridge(
        dead,
        Arc::new(SessionStore::default()),
        Arc::new(ListenerStats::default()),
    )
    .await;

    let url = format!("ws://{}{}", bridge_addr, BRIDGE_PATH);
    let (mut ws, _) = connect_async(url).await.unwrap();

    match tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap()
    {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Error),
        other => panic!("expected close frame, got {:?}", other),
    }

    bridge_shutdown.trigger();
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn health_and_plain_requests() {
    let sessions = Arc::new(SessionStore::default());
    let (bridge_addr, bridge_shutdown) = start_bridge(
        "127.0.0.1:9".parse().unwrap(),
        Arc::clone(&sessions),
        Arc::new(ListenerStats::default()),
    )
    .await;

    let health = http_get(bridge_addr, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"));
    assert!(health.contains(r#""healthy":true"#));
    assert!(health.contains(r#""registeredCommands":2"#));

    let plain = http_get(bridge_addr, BRIDGE_PATH).await;
    assert!(plain.starts_with("HTTP/1.1 400"));

    let missing = http_get(bridge_addr, "/elsewhere").await;
    assert!(missing.starts_with("HTTP/1.1 404"));

    bridge_shutdown.trigger();
}
