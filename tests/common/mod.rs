//! Shared helpers for the socket-level tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;

use rivulet::{Router, Server, ServerConfig, ServerError, handlers};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub async fn start(read_timeout_ms: u64, directory: Option<&Path>) -> Self {
        let mut builder = ServerConfig::builder()
            .host("127.0.0.1")
            .port(0)
            .read_timeout_ms(read_timeout_ms)
            .write_timeout_ms(1000);
        if let Some(dir) = directory {
            builder = builder.directory(dir);
        }
        let config = builder.build();

        let mut router = Router::new();
        handlers::register_defaults(&mut router, &config);

        let server = Server::bind(config, router).await.unwrap();
        let addr = server.local_addr();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));

        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn trigger_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn stopped(self) -> Result<(), ServerError> {
        self.handle.await.unwrap()
    }
}

/// A parsed response as seen on the wire.
#[derive(Debug)]
pub struct RawResponse {
    pub status_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn status(&self) -> u16 {
        self.status_line
            .split(' ')
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Client half of a connection with a buffered reader kept across responses.
pub struct Client {
    pub reader: BufReader<OwnedReadHalf>,
    pub writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    pub async fn send(&mut self, raw: &[u8]) {
        use tokio::io::AsyncWriteExt;
        self.writer.write_all(raw).await.unwrap();
    }

    /// Read one response framed by its `Content-Length` (absent means empty).
    pub async fn response(&mut self) -> RawResponse {
        let mut status_line = String::new();
        self.reader.read_line(&mut status_line).await.unwrap();
        let status_line = status_line.trim_end().to_string();
        assert!(!status_line.is_empty(), "connection closed before a response");

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let (k, v) = line.split_once(':').unwrap();
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }

        let length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.parse::<usize>().unwrap())
            .unwrap_or(0);
        let mut body = vec![0; length];
        self.reader.read_exact(&mut body).await.unwrap();

        RawResponse {
            status_line,
            headers,
            body,
        }
    }

    /// `true` once the server has closed its side.
    pub async fn at_eof(&mut self) -> bool {
        let mut rest = Vec::new();
        matches!(self.reader.read_to_end(&mut rest).await, Ok(0))
    }
}
