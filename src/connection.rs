//! Per-connection protocol handling
//!
//! Each accepted socket gets one task running `handle`: read the initial
//! request, classify it, then run the source ingest or listener egress
//! session until it ends. Failures stay local to this connection and
//! never touch sibling sessions or the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{self, timeout};
use tracing::{debug, info, trace, warn};

use crate::config::RelayConfig;
use crate::constants::{
    KEEPALIVE_INTERVAL_SECS, KEEPALIVE_TIME_SECS, REQUEST_READ_LIMIT, SEED_CHUNK_SIZE,
    SOURCE_READ_BUF,
};
use crate::error::ProtocolError;
use crate::mount::{ListenerHandle, SourceHandle, StreamMeta};
use crate::protocol::request::{ListenerRequest, SourceRequest};
use crate::protocol::{classify, response, ClientKind};
use crate::server::Registry;

/// Handle one accepted connection from start to finish.
pub async fn handle(
    mut stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<Registry>,
    config: RelayConfig,
    shutdown: watch::Receiver<bool>,
) {
    tune_socket(&stream);

    let mut buf = vec![0u8; REQUEST_READ_LIMIT];
    let len = match timeout(config.handshake_timeout(), stream.read(&mut buf)).await {
        Ok(Ok(0)) => {
            debug!(%addr, "connection closed before sending a request");
            return;
        }
        Ok(Ok(len)) => len,
        Ok(Err(err)) => {
            debug!(%addr, error = %err, "failed to read initial request");
            return;
        }
        Err(_) => {
            debug!(%addr, "timed out waiting for initial request");
            return;
        }
    };

    let request = String::from_utf8_lossy(&buf[..len]).into_owned();
    trace!(%addr, request = %request, "initial request");

    match classify(&request) {
        Some(ClientKind::Source) => {
            source_session(stream, addr, &request, registry, config, shutdown).await;
        }
        Some(ClientKind::Listener) => {
            listener_session(stream, addr, &request, registry, config, shutdown).await;
        }
        None => {
            debug!(%addr, "unrecognized request");
            reject(&mut stream, &ProtocolError::BadRequest("Bad Request")).await;
        }
    }
}

/// Source ingest: authenticate, handshake, install on the mount, then
/// pump received chunks into the ring and the broadcast queue until the
/// stream ends one way or another.
async fn source_session(
    mut stream: TcpStream,
    addr: SocketAddr,
    request: &str,
    registry: Arc<Registry>,
    config: RelayConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let req = SourceRequest::parse(request);
    let Some(path) = req.mount.clone() else {
        reject(
            &mut stream,
            &ProtocolError::BadRequest("Bad Request - No mount point specified"),
        )
        .await;
        return;
    };
    if req.password.as_deref() != Some(config.source_password.as_str()) {
        warn!(%addr, mount = %path, "source rejected: invalid password");
        reject(&mut stream, &ProtocolError::Unauthorized).await;
        return;
    }

    if req.expect_continue {
        if let Err(err) = stream.write_all(response::continue_100().as_bytes()).await {
            debug!(%addr, error = %err, "failed to send 100-continue");
            return;
        }
    }
    let handshake = response::source_ok(req.is_put, &req.content_type);
    if let Err(err) = stream.write_all(handshake.as_bytes()).await {
        debug!(%addr, error = %err, "failed to send source handshake");
        return;
    }

    let mount = registry.get_or_create(&path);
    let handle = SourceHandle::new(addr);
    let session_id = handle.id;
    let kick = handle.kick.clone();
    mount.install_source(handle, StreamMeta::from(&req));
    info!(
        mount = %path,
        %addr,
        name = %req.name,
        bitrate = %req.bitrate,
        public = req.is_public,
        "source connected"
    );

    let mut buf = vec![0u8; SOURCE_READ_BUF];
    let mut received: u64 = 0;
    let reason = loop {
        tokio::select! {
            _ = kick.notified() => break "replaced by a newer source",
            _ = shutdown.changed() => break "server shutting down",
            read = timeout(config.source_timeout(), stream.read(&mut buf)) => {
                match read {
                    Ok(Ok(0)) => break "stream ended",
                    Ok(Ok(len)) => {
                        received += len as u64;
                        trace!(mount = %path, bytes = len, "chunk received");
                        if !mount.push_chunk(session_id, Bytes::copy_from_slice(&buf[..len])) {
                            break "replaced by a newer source";
                        }
                    }
                    Ok(Err(err)) => {
                        debug!(mount = %path, error = %err, "source read failed");
                        break "read error";
                    }
                    Err(_) => break "timed out waiting for data",
                }
            }
        }
    };

    // only drop the mount's source reference while it is still ours
    if mount.clear_source_if(session_id) {
        info!(mount = %path, %addr, bytes = received, reason, "source disconnected");
    } else {
        debug!(
            mount = %path,
            %addr,
            bytes = received,
            reason,
            "source session ended after replacement"
        );
    }
}

/// Listener egress: headers, backlog replay, then hold the connection
/// open while the broadcast loop feeds it, watching for disconnect.
async fn listener_session(
    mut stream: TcpStream,
    addr: SocketAddr,
    request: &str,
    registry: Arc<Registry>,
    config: RelayConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let req = ListenerRequest::parse(request);
    let Some(path) = req.mount else {
        reject(&mut stream, &ProtocolError::BadRequest("Bad Request")).await;
        return;
    };
    let Some(mount) = registry.get(&path) else {
        debug!(%addr, mount = %path, "listener requested unknown mount");
        reject(&mut stream, &ProtocolError::MountNotFound(path)).await;
        return;
    };
    if !mount.has_source() {
        debug!(%addr, mount = %path, "listener requested mount without a live source");
        reject(&mut stream, &ProtocolError::NoLiveSource(path)).await;
        return;
    }

    let meta = mount.meta();
    let headers = response::listener_ok(&meta, &path, &config.stream_url(), req.wants_metadata);
    if let Err(err) = stream.write_all(headers.as_bytes()).await {
        debug!(%addr, error = %err, "failed to send listener headers");
        return;
    }
    if req.is_head {
        debug!(%addr, mount = %path, "answered HEAD probe");
        return;
    }

    let (mut read_half, write_half) = stream.into_split();
    let handle = ListenerHandle::new(addr, write_half);
    let listener_id = handle.id;
    let writer = handle.writer.clone();

    // replay the backlog before registering, so however long the paced
    // replay takes, the broadcast loop never waits on this socket
    let (seed, mark) = mount.seed_snapshot();
    let mut guard = writer.lock().await;
    if !seed.is_empty() {
        debug!(mount = %path, bytes = seed.len(), "replaying buffered stream");
        if let Err(err) = replay_backlog(
            &mut guard,
            &seed,
            config.seed_pacing(),
            config.listener_write_timeout(),
        )
        .await
        {
            debug!(%addr, mount = %path, error = %err, "listener dropped during replay");
            return;
        }
    }

    // registration hands back what the source pushed during the replay;
    // the held mutex keeps broadcast writes behind these catch-up bytes
    let (total, residue) = mount.register_listener(handle, mark);
    info!(mount = %path, %addr, listeners = total, "listener connected");
    if !residue.is_empty() {
        let caught_up = timeout(config.listener_write_timeout(), guard.write_all(&residue)).await;
        if !matches!(caught_up, Ok(Ok(()))) {
            drop(guard);
            let remaining = mount.remove_listener(listener_id);
            debug!(
                mount = %path,
                %addr,
                listeners = remaining,
                "listener dropped during catch-up"
            );
            return;
        }
    }
    drop(guard);

    let mut probe = [0u8; 64];
    let mut probe_timer = time::interval(config.liveness_interval());
    let reason = loop {
        tokio::select! {
            _ = shutdown.changed() => break "server shutting down",
            read = read_half.read(&mut probe) => {
                match read {
                    Ok(0) => break "client closed connection",
                    // listeners are not supposed to send anything, ignore it
                    Ok(_) => {}
                    Err(_) => break "socket error",
                }
            }
            _ = probe_timer.tick() => {
                if !mount.has_source() {
                    break "source disconnected";
                }
                if !mount.has_listener(listener_id) {
                    break "dropped by broadcast loop";
                }
            }
        }
    };

    let remaining = mount.remove_listener(listener_id);
    info!(mount = %path, %addr, listeners = remaining, reason, "listener disconnected");
}

/// Replay the Ogg-aligned backlog in paced slices. Each slice write is
/// bounded by the listener write timeout, so a client that stops reading
/// ends its own session instead of idling here indefinitely.
async fn replay_backlog(
    writer: &mut OwnedWriteHalf,
    backlog: &[u8],
    pacing: Duration,
    write_timeout: Duration,
) -> std::io::Result<()> {
    for slice in backlog.chunks(SEED_CHUNK_SIZE) {
        match timeout(write_timeout, writer.write_all(slice)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "backlog write timed out",
                ))
            }
        }
        time::sleep(pacing).await;
    }
    Ok(())
}

/// Send an error response, then let the connection close
async fn reject(stream: &mut TcpStream, err: &ProtocolError) {
    let response = response::rejection(err);
    if let Err(write_err) = stream.write_all(response.as_bytes()).await {
        debug!(error = %write_err, "failed to send error response");
    }
}

/// Keepalive so half-dead links surface as socket errors, nodelay so
/// small audio chunks go out without batching delay
fn tune_socket(stream: &TcpStream) {
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(KEEPALIVE_TIME_SECS))
        .with_interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECS));
    if let Err(err) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        debug!(error = %err, "failed to enable tcp keepalive");
    }
    if let Err(err) = stream.set_nodelay(true) {
        debug!(error = %err, "failed to set nodelay");
    }
}
