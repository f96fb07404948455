//! Per-mount shared state
//!
//! One `Mount` per mount path, holding the active source handle, the
//! listener set, the ring buffer and the pending-chunk queue behind a
//! single mutex. Sessions and the broadcast loop coordinate exclusively
//! through this type.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Notify;
use tracing::info;
use uuid::Uuid;

use crate::buffer::OggRing;
use crate::protocol::request::SourceRequest;

/// Stream metadata advertised to listeners in the `icy-*` headers
#[derive(Debug, Clone)]
pub struct StreamMeta {
    pub name: String,
    pub genre: String,
    pub description: String,
    pub content_type: String,
    pub bitrate: String,
    pub is_public: bool,
}

impl Default for StreamMeta {
    fn default() -> Self {
        Self {
            name: "Untitled Stream".to_string(),
            genre: "Various".to_string(),
            description: String::new(),
            content_type: "audio/ogg".to_string(),
            bitrate: "128".to_string(),
            is_public: true,
        }
    }
}

impl From<&SourceRequest> for StreamMeta {
    fn from(req: &SourceRequest) -> Self {
        Self {
            name: req.name.clone(),
            genre: req.genre.clone(),
            description: req.description.clone(),
            content_type: req.content_type.clone(),
            bitrate: req.bitrate.clone(),
            is_public: req.is_public,
        }
    }
}

/// Identity of a mount's active source session.
///
/// The handle stays in the mount state while the session task owns the
/// socket. `kick` tells the session to exit so the socket gets dropped
/// by its owner rather than closed from the outside.
#[derive(Clone)]
pub struct SourceHandle {
    pub id: Uuid,
    pub addr: SocketAddr,
    pub kick: Arc<Notify>,
}

impl SourceHandle {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            addr,
            kick: Arc::new(Notify::new()),
        }
    }
}

/// A registered listener.
///
/// The write half lives behind an async mutex shared between the
/// session (initial backlog replay) and the broadcast loop, which keeps
/// replay bytes and live chunks from interleaving on the socket.
#[derive(Clone)]
pub struct ListenerHandle {
    pub id: Uuid,
    pub addr: SocketAddr,
    pub writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
}

impl ListenerHandle {
    pub fn new(addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            id: Uuid::new_v4(),
            addr,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
        }
    }
}

/// Point-in-time view of a mount, for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct MountStatus {
    pub path: String,
    pub name: String,
    pub content_type: String,
    pub bitrate: String,
    pub has_source: bool,
    pub listener_count: usize,
    pub buffered_bytes: usize,
    pub total_received: u64,
}

/// Where a pre-registration backlog replay left off.
///
/// Opaque to the caller: obtained from [`Mount::seed_snapshot`], handed
/// back to [`Mount::register_listener`] so the mount can compute what
/// accumulated in between.
#[derive(Debug, Clone, Copy)]
pub struct SeedMark {
    /// Absolute stream offset the seed covered up to
    replayed_to: u64,
    /// Source session the seed belonged to
    source: Option<Uuid>,
}

struct MountState {
    source: Option<SourceHandle>,
    listeners: Vec<ListenerHandle>,
    ring: OggRing,
    pending: VecDeque<Bytes>,
    meta: StreamMeta,
}

impl MountState {
    fn queued_bytes(&self) -> usize {
        self.pending.iter().map(|chunk| chunk.len()).sum()
    }

    /// Page-aligned ring tail minus the bytes still queued for the
    /// broadcast loop, which deliver themselves
    fn aligned_backlog(&self) -> Vec<u8> {
        let mut seed = self.ring.page_aligned_tail();
        seed.truncate(seed.len().saturating_sub(self.queued_bytes()));
        seed
    }
}

/// Shared state for one mount path.
///
/// The mutex is plain (not async) and never held across an await point;
/// every method takes it, mutates, and returns. Socket I/O happens in
/// the callers, outside the lock.
pub struct Mount {
    pub path: String,
    state: Mutex<MountState>,
    /// Wakes the broadcast loop when chunks are queued
    wakeup: Notify,
}

impl Mount {
    pub fn new(path: &str, ring_capacity: usize) -> Self {
        Self {
            path: path.to_string(),
            state: Mutex::new(MountState {
                source: None,
                listeners: Vec::new(),
                ring: OggRing::new(ring_capacity),
                pending: VecDeque::new(),
                meta: StreamMeta::default(),
            }),
            wakeup: Notify::new(),
        }
    }

    /// Install a new source session, replacing and kicking any previous
    /// one. Starts a fresh encoding session: metadata is replaced, the
    /// ring and the pending queue are cleared so no stale bytes bleed
    /// into the new stream.
    pub fn install_source(&self, handle: SourceHandle, meta: StreamMeta) {
        let old = {
            let mut state = self.state.lock();
            let old = state.source.take();
            state.meta = meta;
            state.ring.clear();
            state.pending.clear();
            state.source = Some(handle);
            old
        };
        if let Some(old) = old {
            info!(mount = %self.path, old_source = %old.id, "replacing active source");
            old.kick.notify_one();
        }
    }

    /// Drop the source reference, but only while it still points at the
    /// session calling this. Guards the reconnect race where a newer
    /// source already took the slot.
    pub fn clear_source_if(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        if state.source.as_ref().is_some_and(|source| source.id == id) {
            state.source = None;
            true
        } else {
            false
        }
    }

    pub fn has_source(&self) -> bool {
        self.state.lock().source.is_some()
    }

    /// Append a received chunk to the ring and the pending queue, then
    /// wake the broadcast loop.
    ///
    /// Rejected (chunk dropped, returns false) when `source_id` is no
    /// longer the mount's active source: a replaced source racing its
    /// kick must not bleed bytes into the new session's buffer.
    pub fn push_chunk(&self, source_id: Uuid, chunk: Bytes) -> bool {
        {
            let mut state = self.state.lock();
            let owns = state
                .source
                .as_ref()
                .is_some_and(|source| source.id == source_id);
            if !owns {
                return false;
            }
            state.ring.write(&chunk);
            state.pending.push_back(chunk);
        }
        self.wakeup.notify_one();
        true
    }

    /// Drain every queued chunk (oldest first) together with a snapshot
    /// of the current listener set to deliver them to.
    pub fn take_pending(&self) -> (Vec<Bytes>, Vec<ListenerHandle>) {
        let mut state = self.state.lock();
        let chunks = state.pending.drain(..).collect();
        let listeners = state.listeners.clone();
        (chunks, listeners)
    }

    /// Blocks until `push_chunk` signals new data. A signal that arrived
    /// before this call completes it immediately.
    pub async fn chunks_queued(&self) {
        self.wakeup.notified().await;
    }

    /// Snapshot the backlog for a joining listener: the Ogg page aligned
    /// ring tail minus any bytes still sitting in the pending queue
    /// (those reach the listener through the broadcast loop after it
    /// registers). The returned mark records where the seed ends so
    /// [`register_listener`](Self::register_listener) can close the gap.
    ///
    /// The caller replays the seed *before* registering, so a long
    /// replay never blocks the broadcast loop on this listener's socket.
    pub fn seed_snapshot(&self) -> (Vec<u8>, SeedMark) {
        let state = self.state.lock();
        let seed = state.aligned_backlog();
        let mark = SeedMark {
            replayed_to: state.ring.total_written() - state.queued_bytes() as u64,
            source: state.source.as_ref().map(|source| source.id),
        };
        (seed, mark)
    }

    /// Register a listener, returning the new listener count and the
    /// catch-up residue: the bytes that arrived after the seed mark and
    /// have already left the pending queue. Still-queued bytes follow
    /// via the broadcast loop, so backlog, residue and live stream join
    /// up without a gap or a duplicated stretch.
    ///
    /// When the mark is stale (the ring wrapped past it, or the source
    /// changed since the snapshot) the residue falls back to a fresh
    /// page-aligned backlog, resyncing at a decodable byte.
    ///
    /// Callers must hold the handle's socket mutex across this call and
    /// the residue write, otherwise a broadcast write can slip in ahead
    /// of the residue.
    pub fn register_listener(&self, handle: ListenerHandle, mark: SeedMark) -> (usize, Vec<u8>) {
        let mut state = self.state.lock();
        let same_source = state.source.as_ref().map(|source| source.id) == mark.source;
        let residue = match state.ring.since(mark.replayed_to) {
            Some(mut tail) if same_source => {
                tail.truncate(tail.len().saturating_sub(state.queued_bytes()));
                tail
            }
            _ => state.aligned_backlog(),
        };
        state.listeners.push(handle);
        (state.listeners.len(), residue)
    }

    /// Deregister a listener, returning the remaining count
    pub fn remove_listener(&self, id: Uuid) -> usize {
        let mut state = self.state.lock();
        state.listeners.retain(|listener| listener.id != id);
        state.listeners.len()
    }

    /// Deregister several listeners at once (broadcast prune)
    pub fn remove_listeners(&self, ids: &[Uuid]) -> usize {
        let mut state = self.state.lock();
        state.listeners.retain(|listener| !ids.contains(&listener.id));
        state.listeners.len()
    }

    /// Whether a listener is still registered. Sessions poll this to
    /// notice they were pruned by the broadcast loop.
    pub fn has_listener(&self, id: Uuid) -> bool {
        self.state.lock().listeners.iter().any(|l| l.id == id)
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Server shutdown: kick the source and drop every listener handle
    /// at once, returning the dropped listener count. Session tasks
    /// observe the shutdown flag and exit on their own; the kick covers
    /// a source blocked mid-read, and the listener sockets close once
    /// their sessions let go of the dropped handles.
    pub fn disconnect_all(&self) -> usize {
        let (source, listeners) = {
            let mut state = self.state.lock();
            (state.source.take(), std::mem::take(&mut state.listeners))
        };
        if let Some(source) = source {
            source.kick.notify_one();
        }
        listeners.len()
    }

    pub fn meta(&self) -> StreamMeta {
        self.state.lock().meta.clone()
    }

    pub fn status(&self) -> MountStatus {
        let state = self.state.lock();
        MountStatus {
            path: self.path.clone(),
            name: state.meta.name.clone(),
            content_type: state.meta.content_type.clone(),
            bitrate: state.meta.bitrate.clone(),
            has_source: state.source.is_some(),
            listener_count: state.listeners.len(),
            buffered_bytes: state.ring.len(),
            total_received: state.ring.total_written(),
        }
    }
}
