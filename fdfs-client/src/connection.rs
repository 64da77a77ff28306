use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use fdfs_common::BackendError;

use crate::protocol::{Command, Header, HEADER_LEN};

/// One TCP connection to a tracker or storage node.
///
/// A connection carries one request at a time; concurrent callers each need
/// their own, which is what [`crate::pool::ConnectionPool`] hands out.
pub struct Connection {
    stream: TcpStream,
    addr: String,
    network_timeout: Duration,
    last_used: Instant,
}

async fn timed<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T, BackendError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(BackendError::Timeout { op }),
    }
}

impl Connection {
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        network_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(BackendError::Unavailable(format!("{}: {}", addr, e)));
            }
            Err(_) => {
                return Err(BackendError::Unavailable(format!(
                    "{}: connect timed out after {:?}",
                    addr, connect_timeout
                )));
            }
        };
        stream.set_nodelay(true)?;
        debug!(addr = %addr, local = ?stream.local_addr().ok(), "Opened connection");
        Ok(Self {
            stream,
            addr: addr.to_string(),
            network_timeout,
            last_used: Instant::now(),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.local_addr().ok()
    }

    /// Time since the connection last completed a request.
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Send one request. The body is the concatenation of `parts`, so large
    /// payloads can follow a small prefix without being copied.
    pub async fn send(&mut self, cmd: Command, parts: &[&[u8]]) -> Result<(), BackendError> {
        let body_len: usize = parts.iter().map(|p| p.len()).sum();
        let header = Header::request(cmd, body_len);
        timed(self.network_timeout, "send header", self.stream.write_all(&header.encode())).await?;
        for part in parts {
            timed(self.network_timeout, "send body", self.stream.write_all(part)).await?;
        }
        timed(self.network_timeout, "flush", self.stream.flush()).await?;
        Ok(())
    }

    /// Read one reply. A non-zero status becomes [`BackendError::Status`]
    /// after the body is drained, so the connection stays usable.
    pub async fn recv(&mut self, expected_len: Option<usize>) -> Result<Bytes, BackendError> {
        let mut raw = [0u8; HEADER_LEN];
        timed(self.network_timeout, "recv header", self.stream.read_exact(&mut raw)).await?;
        let header = Header::decode(&raw)?;
        if header.cmd != Command::Response.code() {
            return Err(BackendError::Protocol(format!(
                "unexpected reply command {} from {}",
                header.cmd, self.addr
            )));
        }
        if header.status == 0 {
            if let Some(expected) = expected_len {
                if header.body_len != expected as u64 {
                    return Err(BackendError::Protocol(format!(
                        "reply body is {} bytes, expected {}",
                        header.body_len, expected
                    )));
                }
            }
        }

        // The header length is untrusted: grow the buffer as bytes arrive.
        let mut body = Vec::new();
        if header.body_len > 0 {
            let read = timed(
                self.network_timeout,
                "recv body",
                (&mut self.stream).take(header.body_len).read_to_end(&mut body),
            )
            .await?;
            if (read as u64) < header.body_len {
                return Err(BackendError::Protocol(format!(
                    "reply from {} truncated at {} of {} bytes",
                    self.addr, read, header.body_len
                )));
            }
        }
        self.last_used = Instant::now();

        if header.status != 0 {
            return Err(BackendError::Status {
                code: header.status,
            });
        }
        Ok(Bytes::from(body))
    }

    pub async fn request(
        &mut self,
        cmd: Command,
        parts: &[&[u8]],
        expected_len: Option<usize>,
    ) -> Result<Bytes, BackendError> {
        self.send(cmd, parts).await?;
        self.recv(expected_len).await
    }

    /// Tell the peer we are done, then close. Errors are ignored.
    pub async fn quit(mut self) {
        let header = Header::request(Command::Quit, 0);
        let _ = timed(self.network_timeout, "quit", self.stream.write_all(&header.encode())).await;
        let _ = self.stream.shutdown().await;
    }
}
