//! sigrelay - re-sign inbound HTTP requests with AWS SigV4 and relay them
//! to a fixed upstream host.
//!
//! # Usage
//!
//! ```text
//! AWS_ACCESS_KEY_ID=... AWS_SECRET_ACCESS_KEY=... \
//! AWS_DEFAULT_REGION=us-east-1 AWS_SERVICE=execute-api \
//! AWS_HOST=example.execute-api.us-east-1.amazonaws.com sigrelay
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SIGRELAY_LISTEN` | `0.0.0.0:3000` | Bind address |
//! | `AWS_HOST` | *(required)* | Upstream host |
//! | `AWS_SERVICE` | *(required)* | Service name for the credential scope |
//! | `AWS_DEFAULT_REGION` | *(required)* | Region for the credential scope |
//! | `AWS_ACCESS_KEY_ID` | *(required)* | Access key id |
//! | `AWS_SECRET_ACCESS_KEY` | *(required)* | Secret access key |
//! | `AWS_SESSION_TOKEN` | *(unset)* | Session token for temporary credentials |
//! | `RUST_LOG` | `info` | Log level filter |

mod config;
mod handler;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use log::{error, info, warn};
use sigrelay_core::{Context, OsEnv};
use sigrelay_http_send_reqwest::ReqwestHttpSend;
use tokio::net::TcpListener;

use crate::config::RelayConfig;
use crate::upstream::Upstream;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the accept loop, serving connections until a shutdown signal is
/// received.
async fn serve(listener: TcpListener, upstream: Arc<Upstream>) -> anyhow::Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

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
                        warn!("failed to accept connection: {e}");
                        continue;
                    }
                };

                let upstream = upstream.clone();
                let svc = service_fn(move |req| handler::handle(upstream.clone(), req));
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!("connection error from {peer_addr}: {e}");
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
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let ctx = Context::new()
        .with_env(OsEnv)
        .with_http_send(ReqwestHttpSend::default());

    let config = RelayConfig::load(&ctx)?;
    info!(
        "starting sigrelay {VERSION}: listen={} host={} service={} region={}",
        config.listen, config.host, config.service, config.region
    );

    let upstream = Arc::new(Upstream::new(ctx, &config));

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!("listening on {addr}");

    serve(listener, upstream).await
}
