//! Icecast/SHOUTcast wire protocol
//!
//! Request classification and parsing for source (SOURCE/PUT) and
//! listener (GET/HEAD) clients, plus the handshake, stream and error
//! response builders.

pub mod request;
pub mod response;

pub use request::{classify, ClientKind, ListenerRequest, SourceRequest};
pub use response::SERVER_NAME;
