//! WebSocket to TCP relay
//!
//! One upgraded browser connection is paired with one TCP connection to the
//! protocol listener. Browser frames become request lines, reply lines become
//! frames. Payload bytes are never inspected or rewritten: a line is sent as
//! a text frame when it is valid UTF-8 and as a binary frame otherwise. When
//! either side goes away the other is closed.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::types::{Result, SwitchboardError};

/// How long the browser side gets to flush its close reply
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Relay frames between `ws` and a fresh TCP connection to `upstream`
///
/// If `upstream` cannot be reached the browser connection is closed with
/// code 1011 and the connect error is returned.
pub async fn run_relay<S>(mut ws: WebSocketStream<S>, upstream: SocketAddr) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let tcp = match TcpStream::connect(upstream).await {
        Ok(tcp) => tcp,
        Err(e) => {
            warn!("Bridge upstream {} unreachable: {}", upstream, e);
            let frame = CloseFrame {
                code: CloseCode::Error,
                reason: "upstream unavailable".into(),
            };
            let _ = ws.close(Some(frame)).await;
            return Err(e.into());
        }
    };
    let _ = tcp.set_nodelay(true);
    info!("Bridge relay connected to {}", upstream);

    let (tcp_read, mut tcp_write) = tcp.into_split();
    let (mut ws_sink, mut ws_stream) = ws.split();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    // Upstream lines to browser frames. The sink lives here, so this task
    // also sends the closing handshake whichever side ends first.
    let mut upstream_to_client = tokio::spawn(async move {
        let mut reader = BufReader::new(tcp_read);
        let result = tokio::select! {
            result = forward_to_browser(&mut reader, &mut ws_sink) => result,
            _ = stop_rx => Ok(()),
        };
        let _ = ws_sink.close().await;
        result
    });

    let client_to_upstream = async move {
        let result = forward_to_upstream(&mut ws_stream, &mut tcp_write).await;
        let _ = tcp_write.shutdown().await;
        result
    };

    let result = tokio::select! {
        result = client_to_upstream => {
            debug!("Browser->upstream stream ended");
            let _ = stop_tx.send(());
            match tokio::time::timeout(CLOSE_GRACE, &mut upstream_to_client).await {
                Ok(joined) => result.and(flatten(joined)),
                Err(_) => {
                    upstream_to_client.abort();
                    result
                }
            }
        }
        joined = &mut upstream_to_client => {
            debug!("Upstream->browser stream ended");
            flatten(joined)
        }
    };

    info!("Bridge relay to {} closed", upstream);
    result
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| SwitchboardError::Internal(format!("relay task failed: {}", e)))?
}

/// Copy upstream lines to the browser until upstream closes
///
/// Only the terminating `\n` is stripped; a `\r` before it stays in the frame.
async fn forward_to_browser<R, Si>(reader: &mut BufReader<R>, sink: &mut Si) -> Result<()>
where
    R: AsyncRead + Unpin,
    Si: Sink<Message, Error = WsError> + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            debug!("Upstream closed connection");
            return Ok(());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }

        let frame = match String::from_utf8(std::mem::take(&mut buf)) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Binary(e.into_bytes()),
        };
        sink.send(frame).await?;
    }
}

/// Copy browser frames to upstream, one line per frame, until the browser closes
async fn forward_to_upstream<St, W>(stream: &mut St, tcp_write: &mut W) -> Result<()>
where
    St: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = stream.next().await {
        let mut line = match msg? {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
            Message::Close(frame) => {
                debug!("Browser closed connection: {:?}", frame);
                return Ok(());
            }
            _ => continue,
        };
        line.push(b'\n');
        tcp_write.write_all(&line).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn ws_pair() -> (
        WebSocketStream<tokio::io::DuplexStream>,
        WebSocketStream<tokio::io::DuplexStream>,
    ) {
        let (a, b) = duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (server, client)
    }

    #[tokio::test]
    async fn test_unreachable_upstream_closes_with_1011() {
        // Bind then drop to get a port nobody listens on
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let (server, mut client) = ws_pair().await;

        let relay = tokio::spawn(run_relay(server, addr));

        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match frame {
            Message::Close(Some(close)) => assert_eq!(close.code, CloseCode::Error),
            other => panic!("expected close frame, got {:?}", other),
        }
        assert!(relay.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_relays_lines_verbatim_both_ways() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();
        let (server, mut client) = ws_pair().await;
        let relay = tokio::spawn(run_relay(server, addr));

        let (socket, _) = upstream.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut upstream_lines = BufReader::new(read_half).lines();

        let payload = r#"{"type":"PING", "requestId" : "é-1"}"#;
        client.send(Message::Text(payload.to_string())).await.unwrap();
        assert_eq!(upstream_lines.next_line().await.unwrap().unwrap(), payload);

        // Unsolicited upstream line is pushed through as-is
        write_half.write_all(b"{\"pushed\":true}\n").await.unwrap();
        match client.next().await.unwrap().unwrap() {
            Message::Text(text) => assert_eq!(text, "{\"pushed\":true}"),
            other => panic!("expected text frame, got {:?}", other),
        }

        // Upstream EOF closes the browser side
        drop(write_half);
        drop(upstream_lines);
        let closing = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match client.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closing.is_ok());
        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_browser_close_closes_upstream() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();
        let (server, mut client) = ws_pair().await;
        let relay = tokio::spawn(run_relay(server, addr));

        let (socket, _) = upstream.accept().await.unwrap();
        let mut upstream_lines = BufReader::new(socket).lines();

        client.close(None).await.unwrap();

        let eof = tokio::time::timeout(Duration::from_secs(5), upstream_lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert!(eof.is_none());

        // The browser gets its close handshake answered
        let reply = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap();
        assert!(matches!(reply, Some(Ok(Message::Close(_)))));
        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_upstream_bytes_are_not_rewritten() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();
        let (server, mut client) = ws_pair().await;
        let relay = tokio::spawn(run_relay(server, addr));

        let (mut socket, _) = upstream.accept().await.unwrap();
        socket
            .write_all(b"line-with-cr\r\n\xff\xfe bad utf8\nafter\n")
            .await
            .unwrap();

        match client.next().await.unwrap().unwrap() {
            Message::Text(text) => assert_eq!(text, "line-with-cr\r"),
            other => panic!("expected text frame, got {:?}", other),
        }
        match client.next().await.unwrap().unwrap() {
            Message::Binary(data) => assert_eq!(data, b"\xff\xfe bad utf8".to_vec()),
            other => panic!("expected binary frame, got {:?}", other),
        }
        match client.next().await.unwrap().unwrap() {
            Message::Text(text) => assert_eq!(text, "after"),
            other => panic!("expected text frame, got {:?}", other),
        }

        // Upstream EOF ends the relay and closes the browser side
        drop(socket);
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(Ok(msg)) = client.next().await {
                if msg.is_close() {
                    break;
                }
            }
        })
        .await
        .unwrap();
        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_binary_frame_reaches_upstream_unchanged() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();
        let (server, mut client) = ws_pair().await;
        let relay = tokio::spawn(run_relay(server, addr));

        let (socket, _) = upstream.accept().await.unwrap();
        let mut reader = BufReader::new(socket);

        client
            .send(Message::Binary(b"\x00raw\xff".to_vec()))
            .await
            .unwrap();
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line).await.unwrap();
        assert_eq!(line, b"\x00raw\xff\n".to_vec());

        client.close(None).await.unwrap();
        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_browser_vanishing_is_a_transport_error() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();
        let (server, client) = ws_pair().await;
        let relay = tokio::spawn(run_relay(server, addr));

        let (_socket, _) = upstream.accept().await.unwrap();
        drop(client);

        let err = tokio::time::timeout(Duration::from_secs(5), relay)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::WebSocket(_)));
        assert!(err.is_transport());
    }
}
