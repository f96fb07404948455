//! Per-mount broadcast loop
//!
//! One long-lived task per mount. It sleeps until the source session
//! queues chunks (with a bounded wait so shutdown is always noticed),
//! then drains the queue and fans each chunk out to every registered
//! listener. Listeners whose sockets fail are pruned after the
//! iteration; delivery to the others continues undisturbed.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::mount::{ListenerHandle, Mount};

/// Run the broadcast loop for one mount until shutdown.
pub async fn run(mount: Arc<Mount>, config: RelayConfig, mut shutdown: watch::Receiver<bool>) {
    debug!(mount = %mount.path, "broadcast loop started");
    while !*shutdown.borrow() {
        tokio::select! {
            _ = mount.chunks_queued() => {}
            _ = time::sleep(config.broadcast_wait()) => {}
            changed = shutdown.changed() => {
                // a dropped sender means the server is gone
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }
        deliver_pending(&mount, config.listener_write_timeout()).await;
    }
    debug!(mount = %mount.path, "broadcast loop stopped");
}

/// Drain the queue and write every chunk, oldest first, to each
/// listener. Failed listeners are skipped for the rest of the drain and
/// removed at the end.
async fn deliver_pending(mount: &Mount, write_timeout: Duration) {
    let (chunks, listeners) = mount.take_pending();
    if chunks.is_empty() || listeners.is_empty() {
        return;
    }

    let mut dead: Vec<Uuid> = Vec::new();
    for chunk in &chunks {
        for listener in &listeners {
            if dead.contains(&listener.id) {
                continue;
            }
            if !write_chunk(listener, chunk, write_timeout).await {
                dead.push(listener.id);
            }
        }
    }

    if !dead.is_empty() {
        let remaining = mount.remove_listeners(&dead);
        info!(
            mount = %mount.path,
            pruned = dead.len(),
            remaining,
            "pruned unresponsive listeners"
        );
    }
}

/// Write one chunk to one listener. The timeout covers the wait for the
/// socket mutex as well as the write itself, so one listener stuck
/// mid-write holds the loop for at most one timeout before it is
/// dropped.
async fn write_chunk(listener: &ListenerHandle, chunk: &Bytes, write_timeout: Duration) -> bool {
    let attempt = async {
        let mut writer = listener.writer.lock().await;
        writer.write_all(chunk).await
    };
    match time::timeout(write_timeout, attempt).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            debug!(listener = %listener.id, error = %err, "listener write failed");
            false
        }
        Err(_) => {
            debug!(listener = %listener.id, "listener write timed out");
            false
        }
    }
}
