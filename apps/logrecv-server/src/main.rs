//! logrecv server - receives log files pushed through the S3 API over TLS.
//!
//! Objects land below `ROOT_FOLDER` as `<bucket>/<key>`, gzip bodies are
//! stored decompressed, and with `AGGREGATE` set every upload is appended to
//! a per-day `<bucket>/<YYYYMMDD>.log` instead.
//!
//! # Usage
//!
//! ```text
//! SERVER_PORT=0.0.0.0:8443 ACCESS_KEY=... SECRET=... logrecv-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SERVER_PORT` | `0.0.0.0:8443` | Bind address |
//! | `SERVER_KEY` | `data/key.pem` | PEM private key |
//! | `SERVER_CERT` | `data/certificate.pem` | PEM certificate chain |
//! | `SNI_NAME` | `localhost` | Public host name |
//! | `ACCESS_KEY` | `AKIAI44QH8DHBEXAMPLE` | Accepted access key |
//! | `SECRET` | *(example key)* | Secret for the access key |
//! | `VERBOSE` | `false` | Log every request with its headers |
//! | `AGGREGATE` | `false` | Append uploads to a per-day log |
//! | `ROOT_FOLDER` | `data/objects` | Object tree root |
//! | `STAGING_FOLDER` | `data/staging` | Multipart part staging |
//! | `MD5_POLICY` | `reject` | `reject` or `warn` on Content-MD5 mismatch |
//! | `UPLOAD_TTL_SECS` | `86400` | Lifetime of an incomplete upload |
//! | `REAP_INTERVAL_SECS` | `3600` | Period of the expired-upload reaper |
//! | `BODY_READ_TIMEOUT_SECS` | `60` | Time allowed to receive a body |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//!
//! When the certificate or key cannot be loaded a self-signed certificate for
//! `SNI_NAME` is generated at startup.

mod cli;
mod tls;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use logrecv_core::ReceiverConfig;
use logrecv_http::{Receiver, ReceiverService};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the given filter.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Create the object root and the staging directory.
async fn prepare_dirs(config: &ReceiverConfig) -> Result<()> {
    for dir in [&config.root_dir, &config.staging_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// Run the accept loop, serving TLS connections until a shutdown signal is received.
async fn serve(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    service: ReceiverService,
) -> Result<()> {
    let graceful = GracefulShutdown::new();
    let mut http = HttpConnBuilder::new(TokioExecutor::new());
    http.http1()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT);

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let acceptor = acceptor.clone();
                let http = http.clone();
                let svc = service.clone();
                let watcher = graceful.watcher();

                tokio::spawn(async move {
                    let tls = match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                        Ok(Ok(tls)) => tls,
                        Ok(Err(e)) => {
                            debug!(%peer_addr, error = %e, "TLS handshake failed");
                            return;
                        }
                        Err(_) => {
                            debug!(%peer_addr, "TLS handshake timed out");
                            return;
                        }
                    };

                    let conn = http.serve_connection(TokioIo::new(tls), svc);
                    if let Err(e) = watcher.watch(conn.into_owned()).await {
                        debug!(%peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_filter())?;

    let config = cli.receiver_config();
    info!(
        listen = %cli.listen,
        domain = %cli.domain,
        root = %config.root_dir.display(),
        staging = %config.staging_dir.display(),
        aggregate = config.aggregate,
        md5_policy = %config.md5_policy,
        version = VERSION,
        "starting logrecv server",
    );

    prepare_dirs(&config).await?;

    let acceptor = tls::acceptor(&cli.cert, &cli.key, &cli.domain)?;

    let receiver = Arc::new(Receiver::from_config(&config));
    let reaper = receiver.uploads().spawn_reaper(config.reap_interval());
    let service = ReceiverService::from_shared(receiver, cli.http_config());

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind to {}", cli.listen))?;

    info!(addr = %cli.listen, "listening for connections");

    let result = serve(listener, acceptor, service).await;
    reaper.abort();
    result
}
