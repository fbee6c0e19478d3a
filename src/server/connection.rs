//! Per-connection request/response loop.
//!
//! One [`Connection`] owns one accepted stream and cycles through
//!
//! ```text
//! AwaitingRequest -> Parsing -> Routing -> Compressing -> Writing
//!        ^                                                  |
//!        +------------------ keep-alive --------------------+
//! ```
//!
//! until the peer disconnects, asks for `Connection: close`, sends something
//! unparseable, or misses a deadline. Requests on one connection are handled
//! strictly one after another.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use crate::compression;
use crate::config::ServerConfig;
use crate::http::{RequestError, read_request};
use crate::router::Router;

/// Why a connection ended abnormally.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The request could not be read or was rejected. No response is sent.
    #[error("failed to read request: {0}")]
    Parse(#[from] RequestError),

    /// The next request did not arrive before the read deadline.
    #[error("read deadline elapsed")]
    ReadTimeout,

    /// The response could not be handed to the transport before the write
    /// deadline.
    #[error("write deadline elapsed")]
    WriteTimeout,

    #[error("failed to write response: {0}")]
    WriteFailure(#[source] io::Error),

    /// `now + timeout` could not be represented as an instant.
    #[error("connection deadline cannot be represented")]
    DeadlineOverflow,
}

impl ConnectionError {
    /// `true` for endings that are routine for a keep-alive server (idle
    /// timeouts) rather than something worth a warning.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::ReadTimeout)
    }
}

/// Drives the request/response cycle for a single client stream.
pub struct Connection<S> {
    stream: S,
    peer: String,
    router: Arc<Router>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an accepted stream. `peer` is only used for logging.
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        router: Arc<Router>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            stream,
            peer: peer.into(),
            router,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        }
    }

    /// Serve requests until the connection ends.
    ///
    /// A clean disconnect by the peer, or a `Connection: close` exchange, returns
    /// `Ok(())`. The stream is shut down and dropped on every path.
    pub async fn serve(self) -> Result<(), ConnectionError> {
        let Self {
            stream,
            peer,
            router,
            read_timeout,
            write_timeout,
        } = self;

        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let result: Result<(), ConnectionError> = async {
            loop {
                // Deadlines are refreshed for every request on the connection.
                let now = Instant::now();
                let read_deadline = now
                    .checked_add(read_timeout)
                    .ok_or(ConnectionError::DeadlineOverflow)?;
                let write_deadline = now
                    .checked_add(write_timeout)
                    .ok_or(ConnectionError::DeadlineOverflow)?;

                let request = match timeout_at(read_deadline, read_request(&mut reader)).await {
                    Ok(Ok(request)) => request,
                    Ok(Err(e)) if e.is_connection_closed() => {
                        debug!(peer = %peer, "connection closed by peer");
                        return Ok(());
                    }
                    Ok(Err(e)) => return Err(ConnectionError::Parse(e)),
                    Err(_) => return Err(ConnectionError::ReadTimeout),
                };

                let mut response = router.dispatch(&request);

                let encoding = compression::negotiate(&request, &mut response);
                response.ensure_content_length();
                let close = request.wants_close();
                if close {
                    response.set_header("Connection", "close");
                }

                let status = response.status();
                match timeout_at(write_deadline, response.write_to(&mut writer)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err(ConnectionError::WriteFailure(e)),
                    Err(_) => return Err(ConnectionError::WriteTimeout),
                }

                info!(
                    peer = %peer,
                    method = %request.method(),
                    path = request.path(),
                    status,
                    encoding = encoding.map(|e| e.as_str()),
                    "request served"
                );

                if close {
                    debug!(peer = %peer, "Connection: close, shutting down");
                    return Ok(());
                }
            }
        }
        .await;

        if let Err(e) = writer.shutdown().await {
            debug!(peer = %peer, error = %e, "error shutting down stream");
        }
        result
    }
}
