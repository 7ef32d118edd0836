//! Per-connection event loops
//!
//! One task per accepted socket. Each loop iteration first gives the
//! session's active streams a chance to emit a page, then waits briefly for
//! socket data; received bytes go through the protocol engine and its
//! replies are written back. The loop ends on peer close, read failure, or
//! idle timeout.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, HandshakeError, HttpError, Result};
use crate::http::{HttpReply, HttpRequest, HttpResponse, HttpSession, Method, RtmptCommand};
use crate::protocol::constants::HANDSHAKE_READ_RETRIES;
use crate::protocol::RtmpSession;

use super::context::ServerContext;

const READ_CHUNK: usize = 4096;

/// Largest request head + body we will buffer before giving up
const MAX_REQUEST_SIZE: usize = 1 << 20;

pub async fn handle_rtmp(ctx: Arc<ServerContext>, stream: TcpStream, peer: SocketAddr) {
    ctx.stats.connection_opened();
    tracing::info!(peer = %peer, "rtmp connection");

    let mut session = RtmpSession::new(
        Arc::clone(&ctx.registry),
        ctx.plugins.clone(),
        Arc::clone(&ctx.stats),
        ctx.config.docroot.clone(),
    );
    if let Err(err) = drive_rtmp(&ctx, &mut session, stream).await {
        tracing::info!(peer = %peer, error = %err, "rtmp connection ended");
    }
    session.detach();
    ctx.stats.connection_closed();
}

async fn drive_rtmp(
    ctx: &ServerContext,
    session: &mut RtmpSession,
    mut stream: TcpStream,
) -> Result<()> {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut handshake_reads = 0u32;
    let mut bytes_seen = 0usize;

    loop {
        for reply in session.service()? {
            ctx.stats.add_bytes_out(reply.len() as u64);
            stream.write_all(&reply).await?;
        }

        let playing = session
            .handler()
            .map(|h| !h.playing_stream_ids().is_empty())
            .unwrap_or(false);
        let wait = if playing {
            ctx.config.poll_interval
        } else {
            ctx.config.read_timeout
        };

        match timeout(wait, stream.read(&mut buf)).await {
            // Nothing from the peer; go feed the streams again
            Err(_) if playing => continue,
            Err(_) => return Err(Error::Timeout),
            Ok(Ok(0)) => return Ok(()),
            Ok(Ok(n)) => {
                ctx.stats.add_bytes_in(n as u64);
                for reply in session.receive(&buf[..n]).await? {
                    ctx.stats.add_bytes_out(reply.len() as u64);
                    stream.write_all(&reply).await?;
                }
                // A peer that dribbles the handshake out indefinitely gets
                // a bounded number of reads to finish it
                if !session.handshake_done() {
                    handshake_reads += 1;
                    bytes_seen += n;
                    if handshake_reads > HANDSHAKE_READ_RETRIES {
                        return Err(HandshakeError::Truncated(bytes_seen).into());
                    }
                }
            }
            Ok(Err(err)) => return Err(err.into()),
        }
    }
}

pub async fn handle_http(ctx: Arc<ServerContext>, stream: TcpStream, peer: SocketAddr) {
    ctx.stats.connection_opened();
    tracing::debug!(peer = %peer, "http connection");

    if let Err(err) = drive_http(&ctx, stream).await {
        tracing::info!(peer = %peer, error = %err, "http connection ended");
    }
    ctx.stats.connection_closed();
}

async fn drive_http(ctx: &ServerContext, mut stream: TcpStream) -> Result<()> {
    let mut session = HttpSession::new(ctx.config.docroot.clone(), Arc::clone(&ctx.stats));
    let mut acc = BytesMut::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let (request, consumed) = match read_request(ctx, &mut stream, &mut acc, &mut buf).await? {
            Some(parsed) => parsed,
            None => return Ok(()), // peer closed between requests
        };
        acc.advance(consumed);
        let keep_alive = request.keep_alive();

        if request.method == Method::Post && RtmptCommand::is_tunnel_path(&request.path) {
            let reply = tunnel_reply(ctx, &request).await?;
            ctx.stats.add_bytes_out(reply.len() as u64);
            stream.write_all(&reply).await?;
        } else {
            match session.process_request(&request) {
                HttpReply::Full(reply) => {
                    ctx.stats.add_bytes_out(reply.len() as u64);
                    stream.write_all(&reply).await?;
                }
                HttpReply::Streaming(head) => {
                    ctx.stats.add_bytes_out(head.len() as u64);
                    stream.write_all(&head).await?;
                    while let Some(page) = session.service() {
                        ctx.stats.add_bytes_out(page.len() as u64);
                        stream.write_all(&page).await?;
                    }
                }
            }
        }

        if !keep_alive {
            return Ok(());
        }
    }
}

/// Read until one full request is buffered; returns it plus the number of
/// bytes it occupies in `acc`
async fn read_request(
    ctx: &ServerContext,
    stream: &mut TcpStream,
    acc: &mut BytesMut,
    buf: &mut [u8],
) -> Result<Option<(HttpRequest, usize)>> {
    loop {
        if let Some(head_end) = acc.windows(4).position(|w| w == b"\r\n\r\n") {
            match HttpRequest::parse(&acc[..]) {
                Ok(request) => {
                    let consumed = head_end + 4 + request.body.len();
                    return Ok(Some((request, consumed)));
                }
                Err(Error::Http(HttpError::ShortBody)) => {} // keep reading
                Err(err) => {
                    stream.write_all(&HttpResponse::bad_request().format()).await?;
                    return Err(err);
                }
            }
        }
        if acc.len() > MAX_REQUEST_SIZE {
            stream.write_all(&HttpResponse::bad_request().format()).await?;
            return Err(HttpError::BadRequestLine.into());
        }

        let n = timeout(ctx.config.read_timeout, stream.read(buf))
            .await
            .map_err(|_| Error::Timeout)??;
        if n == 0 {
            if acc.is_empty() {
                return Ok(None);
            }
            return Err(Error::Closed);
        }
        ctx.stats.add_bytes_in(n as u64);
        acc.extend_from_slice(&buf[..n]);
    }
}

/// Serve one RTMPT command against the tunnel table
async fn tunnel_reply(ctx: &ServerContext, request: &HttpRequest) -> Result<bytes::Bytes> {
    let command = match RtmptCommand::parse(&request.path) {
        Ok(command) => command,
        Err(err) => {
            tracing::debug!(path = %request.path, error = %err, "bad tunnel path");
            return Ok(HttpResponse::bad_request().format());
        }
    };

    let body = match command {
        RtmptCommand::Open => {
            let session = RtmpSession::new(
                Arc::clone(&ctx.registry),
                ctx.plugins.clone(),
                Arc::clone(&ctx.stats),
                ctx.config.docroot.clone(),
            );
            let id = ctx.tunnels.open(session).await;
            bytes::Bytes::from(format!("{id}\n"))
        }
        RtmptCommand::Send { client, .. } => match ctx.tunnels.send(client, &request.body).await {
            Some(reply) => reply?,
            None => return Ok(HttpResponse::not_found().format()),
        },
        RtmptCommand::Idle { client, .. } => match ctx.tunnels.idle(client).await {
            Some(reply) => reply?,
            None => return Ok(HttpResponse::not_found().format()),
        },
        RtmptCommand::Close { client } => {
            if !ctx.tunnels.close(client).await {
                return Ok(HttpResponse::not_found().format());
            }
            bytes::Bytes::new()
        }
    };

    Ok(HttpResponse::ok("application/x-fcs", body)
        .with_keep_alive(request.keep_alive())
        .format())
}
