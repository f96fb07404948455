//! # icy-relay
//!
//! Icecast/SHOUTcast-compatible ingest and fan-out relay for live audio.
//!
//! One publishing client ("source") pushes an encoded audio feed to a named
//! mount point; the relay fans the bytes out, untouched, to every listener
//! currently attached to that mount. The server is byte-transparent: it
//! never decodes, transcodes or re-frames the audio, it only keeps track of
//! Ogg page boundaries so that late joiners start on a decodable byte.
//!
//! ## Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────┐
//!   SOURCE ──SOURCE/PUT──▶ │  RelayServer         │ ◀──GET /live── LISTENERS
//!   (encoder)              │  accept loop         │                (players)
//!                          └──────────┬───────────┘
//!                                     │ one task per connection
//!                                     ▼
//!                          ┌──────────────────────┐
//!                          │  connection handler  │
//!                          │  classify + auth     │
//!                          └───┬──────────────┬───┘
//!                     source   │              │   listener
//!                              ▼              ▼
//!                   ┌────────────────────────────────────┐
//!                   │  Mount "/live"                     │
//!                   │  ┌───────────┐  ┌───────────────┐  │
//!                   │  │  OggRing  │  │ pending queue │  │
//!                   │  │  (2 MiB)  │  │  + wake       │  │
//!                   │  └─────┬─────┘  └───────┬───────┘  │
//!                   │        │ seed           │ drain    │
//!                   │        ▼                ▼          │
//!                   │  new listener     broadcast loop   │
//!                   │  backlog replay   fan-out + prune  │
//!                   └────────────────────────────────────┘
//!                                     │
//!                                     ▼
//!                        listener sockets (in order,
//!                        slow/dead ones pruned)
//! ```
//!
//! Each accepted connection runs on its own tokio task. Each mount has a
//! single broadcast loop, so all listeners of a mount observe chunks in the
//! exact order the source produced them.

pub mod broadcast;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod mount;
pub mod protocol;
pub mod server;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use server::RelayServer;

/// Application-wide constants
pub mod constants {
    /// Default TCP port for the relay
    pub const DEFAULT_PORT: u16 = 8000;

    /// Default shared source password
    pub const DEFAULT_PASSWORD: &str = "hackme";

    /// Ring buffer capacity in bytes (about 2 minutes at 128 kbps)
    pub const RING_CAPACITY: usize = 2 * 1024 * 1024;

    /// Ogg page sync marker; replays for new listeners start here
    pub const OGG_PAGE_MARKER: &[u8; 4] = b"OggS";

    /// Maximum bytes read from a connection while classifying it
    pub const REQUEST_READ_LIMIT: usize = 1024;

    /// Read buffer size for source audio chunks
    pub const SOURCE_READ_BUF: usize = 8192;

    /// Seconds a source may stay silent before its session ends
    pub const SOURCE_SILENCE_TIMEOUT_SECS: u64 = 10;

    /// Seconds a single listener write may take before that listener is pruned
    pub const LISTENER_WRITE_TIMEOUT_SECS: u64 = 5;

    /// Seconds the broadcast loop waits for traffic before re-checking shutdown
    pub const BROADCAST_WAIT_SECS: u64 = 1;

    /// Seconds allowed for reading the initial request of a connection
    pub const HANDSHAKE_TIMEOUT_SECS: u64 = 5;

    /// Seconds between source-liveness probes in the listener holding loop
    pub const LIVENESS_INTERVAL_SECS: u64 = 1;

    /// Seconds granted to each broadcast loop to wind down on shutdown
    pub const SHUTDOWN_JOIN_SECS: u64 = 2;

    /// Slice size for replaying buffered audio to a new listener
    pub const SEED_CHUNK_SIZE: usize = 4096;

    /// Pause between backlog slices so new listeners are not burst-flooded
    pub const SEED_PACING_MS: u64 = 20;

    /// Metadata interval advertised to listeners that request ICY metadata
    pub const ICY_METAINT: u32 = 16384;

    /// TCP keepalive idle time for accepted sockets
    pub const KEEPALIVE_TIME_SECS: u64 = 30;

    /// TCP keepalive probe interval once the idle time has passed
    pub const KEEPALIVE_INTERVAL_SECS: u64 = 10;
}
