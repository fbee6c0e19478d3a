//! Async TCP server using Tokio.
//!
//! [`Server`] owns the listening socket and spawns one [`Connection`] task per
//! accepted stream. The route table is built before binding and shared
//! read-only by every connection.
//!
//! Shutdown is cooperative: once the shutdown future passed to
//! [`Server::run_until`] resolves, the listener is closed and the server waits
//! for every in-flight connection to finish its current exchange.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::router::Router;

pub mod connection;

pub use connection::{Connection, ConnectionError};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// The rivulet HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use rivulet::{Request, Response, Router, Server, ServerConfig, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.exact("/", |_req: &Request| Response::new(StatusCode::Ok).body("Hello!"));
///
///     let server = Server::bind(ServerConfig::default(), router).await?;
///     server
///         .run_until(async {
///             let _ = tokio::signal::ctrl_c().await;
///         })
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    router: Arc<Router>,
}

impl Server {
    /// Binds the server to `config`'s address. The router is frozen from here on.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(config: ServerConfig, router: Router) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => return Err(ServerError::Bind { addr, source }),
        };
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            config,
            router: Arc::new(router),
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the process is terminated.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves, then drain.
    ///
    /// Accept errors are logged and do not stop the loop. After `shutdown`
    /// resolves the listener is dropped, so new connection attempts are refused,
    /// and this method returns once every spawned connection task has ended.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            local_addr,
            config,
            router,
        } = self;

        info!(address = %local_addr, "rivulet listening");

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    debug!(peer = %peer_addr, "connection accepted");
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer_addr, error = %e, "failed to set TCP_NODELAY");
                    }

                    let router = Arc::clone(&router);
                    let connection = Connection::new(stream, peer_addr.to_string(), router, &config);
                    connections.spawn(async move {
                        log_outcome(peer_addr, connection.serve().await);
                    });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(listener);
        info!(in_flight = connections.len(), "waiting for connections to finish");
        while let Some(joined) = connections.join_next().await {
            log_join(joined);
        }
        info!("server stopped");

        Ok(())
    }
}

fn log_outcome(peer: SocketAddr, outcome: Result<(), ConnectionError>) {
    match outcome {
        Ok(()) => debug!(peer = %peer, "connection closed"),
        Err(e) if e.is_benign() => debug!(peer = %peer, reason = %e, "connection closed"),
        Err(e) => warn!(peer = %peer, error = %e, "connection closed with error"),
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "connection task failed");
    }
}
