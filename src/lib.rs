//! # rivulet
//!
//! A small HTTP/1.1 server: line-oriented request parsing, exact and
//! longest-prefix routing, gzip negotiation, and persistent connections with
//! per-request read/write deadlines.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rivulet::{Request, Response, Router, Server, ServerConfig, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.exact("/", |_req: &Request| Response::new(StatusCode::Ok).body("Hello, World!"));
//!
//!     let config = ServerConfig::builder().host("127.0.0.1").port(8080).build();
//!     let server = Server::bind(config, router).await?;
//!     println!("Listening on http://{}", server.local_addr());
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod config;
pub mod handlers;
pub mod http;
pub mod router;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{Handler, Router};
pub use server::{Server, ServerError};
