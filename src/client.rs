//! Line protocol client
//!
//! Minimal request/response client over one TCP connection. Requests without
//! a `requestId` get a generated one, and every reply is checked against the
//! id it answers.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::protocol::{Message, Response};
use crate::types::{Result, SwitchboardError};

pub struct LineClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

impl LineClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read_half).lines(),
            writer,
            next_id: 1,
        })
    }

    /// Send a request and wait for its reply
    pub async fn send(&mut self, mut message: Message) -> Result<Response> {
        if message.request_id.is_none() {
            message.request_id = Some(format!("c-{}", self.next_id));
            self.next_id += 1;
        }
        let expected = message.reply_id().to_string();

        let line = serde_json::to_string(&message)?;
        let response = self.send_raw(&line).await?;
        if response.request_id != expected {
            return Err(SwitchboardError::Protocol(format!(
                "reply for {} while waiting for {}",
                response.request_id, expected
            )));
        }
        Ok(response)
    }

    /// Write one raw line (terminator added) and read one reply
    pub async fn send_raw(&mut self, line: &str) -> Result<Response> {
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');
        self.writer.write_all(&frame).await?;

        let reply = self.lines.next_line().await?.ok_or_else(|| {
            SwitchboardError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed connection",
            ))
        })?;
        Ok(serde_json::from_str(&reply)?)
    }
}
