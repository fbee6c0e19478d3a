//! rivulet server binary
//!
//! Mounts the stock handlers and serves until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rivulet::config::ServerConfigBuilder;
use rivulet::{Router, Server, ServerConfig, handlers};
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt};

/// Minimal HTTP/1.1 server
#[derive(Parser, Debug)]
#[command(name = "rivulet-server")]
#[command(version)]
struct Args {
    /// Directory served under /files/
    #[arg(long)]
    directory: Option<PathBuf>,

    /// JSON config file; flags given on the command line take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Per-request read timeout in milliseconds
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Per-request write timeout in milliseconds
    #[arg(long)]
    write_timeout_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, rivulet::ConfigError> {
        let base = match &self.config {
            Some(path) => ServerConfig::from_json_file(path)?,
            None => ServerConfig::default(),
        };

        let mut builder = ServerConfigBuilder::from_config(base);
        if let Some(host) = self.host {
            builder = builder.host(host);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(ms) = self.read_timeout_ms {
            builder = builder.read_timeout_ms(ms);
        }
        if let Some(ms) = self.write_timeout_ms {
            builder = builder.write_timeout_ms(ms);
        }
        if let Some(dir) = self.directory {
            builder = builder.directory(dir);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rivulet=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        address = %config.listen_addr(),
        read_timeout_ms = config.read_timeout_ms,
        write_timeout_ms = config.write_timeout_ms,
        directory = ?config.directory,
        "configuration loaded"
    );

    let mut router = Router::new();
    handlers::register_defaults(&mut router, &config);

    let server = match Server::bind(config, router).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run_until(shutdown_signal()).await {
        tracing::error!("server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
