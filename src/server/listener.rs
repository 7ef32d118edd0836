//! Accept loops
//!
//! One listener each for RTMP and HTTP (RTMPT rides the HTTP port), plus
//! the optional admin console. A shared semaphore caps concurrent
//! connections; a watch channel carries the shutdown signal into every
//! loop.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};

use crate::error::Result;
use crate::session::Protocol;

use super::admin;
use super::connection;
use super::context::ServerContext;

/// Bind every listener and serve until the shutdown signal flips
pub async fn run(ctx: Arc<ServerContext>, shutdown: watch::Receiver<bool>) -> Result<()> {
    let rtmp = TcpListener::bind(ctx.config.rtmp_addr()).await?;
    let http = TcpListener::bind(ctx.config.http_addr()).await?;
    tracing::info!(addr = %ctx.config.rtmp_addr(), "rtmp listening");
    tracing::info!(addr = %ctx.config.http_addr(), "http listening");

    if ctx.config.admin_enabled {
        let admin_ctx = Arc::clone(&ctx);
        let admin_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = admin::run(admin_ctx, admin_shutdown).await {
                tracing::error!(error = %err, "admin listener failed");
            }
        });
    }

    ctx.start_cleanup();

    let limit = Arc::new(Semaphore::new(ctx.config.spawn_limit()));
    let rtmp_task = accept_loop(Arc::clone(&ctx), rtmp, Protocol::Rtmp, Arc::clone(&limit), shutdown.clone());
    let http_task = accept_loop(Arc::clone(&ctx), http, Protocol::Http, limit, shutdown);

    let (a, b) = tokio::join!(rtmp_task, http_task);
    a.and(b)
}

async fn accept_loop(
    ctx: Arc<ServerContext>,
    listener: TcpListener,
    protocol: Protocol,
    limit: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!(protocol = protocol.name(), "listener stopping");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };

        let permit = match Arc::clone(&limit).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(peer = %peer, "connection limit reached, dropping");
                continue;
            }
        };

        let single_threaded = ctx.config.single_threaded;
        let ctx = Arc::clone(&ctx);
        let task = async move {
            match protocol {
                Protocol::Rtmp => connection::handle_rtmp(ctx, stream, peer).await,
                _ => connection::handle_http(ctx, stream, peer).await,
            }
            drop(permit);
        };

        if single_threaded {
            task.await;
        } else {
            tokio::spawn(task);
        }
    }
}
