//! Response builders
//!
//! All responses are built as plain strings and written by the caller,
//! so the exact wire bytes are testable without a socket.

use crate::constants::ICY_METAINT;
use crate::error::ProtocolError;
use crate::mount::StreamMeta;

/// Server identification sent in handshake and error responses
pub const SERVER_NAME: &str = concat!("icy-relay/", env!("CARGO_PKG_VERSION"));

/// Interim response for sources that sent `Expect: 100-continue`
pub fn continue_100() -> &'static str {
    "HTTP/1.1 100 Continue\r\n\r\n"
}

/// Final source handshake. PUT clients get a plain HTTP 200, legacy
/// SOURCE clients the ICY variant.
pub fn source_ok(is_put: bool, content_type: &str) -> String {
    let status = if is_put {
        format!("HTTP/1.0 200 OK\r\nServer: {SERVER_NAME}\r\n")
    } else {
        String::from("ICY 200 OK\r\n")
    };
    format!("{status}Cache-Control: no-cache\r\nContent-Type: {content_type}\r\n\r\n")
}

/// Listener response headers, after which raw stream bytes follow.
///
/// `icy-metaint` is advertised as a fixed interval when the client asked
/// for metadata and `0` otherwise; either way no metadata blocks are ever
/// injected into the byte stream.
pub fn listener_ok(
    meta: &StreamMeta,
    mount: &str,
    base_url: &str,
    wants_metadata: bool,
) -> String {
    let metaint = if wants_metadata { ICY_METAINT } else { 0 };
    format!(
        "HTTP/1.0 200 OK\r\n\
         Server: {SERVER_NAME}\r\n\
         Cache-Control: no-cache\r\n\
         Pragma: no-cache\r\n\
         Content-Type: {}\r\n\
         icy-name: {}\r\n\
         icy-genre: {}\r\n\
         icy-description: {}\r\n\
         icy-pub: {}\r\n\
         icy-br: {}\r\n\
         icy-metaint: {}\r\n\
         icy-url: {}{}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Headers: *\r\n\
         Access-Control-Allow-Methods: GET, OPTIONS\r\n\
         \r\n",
        meta.content_type,
        meta.name,
        meta.genre,
        meta.description,
        if meta.is_public { "1" } else { "0" },
        meta.bitrate,
        metaint,
        base_url,
        mount,
    )
}

/// Error response with a minimal HTML body, used for every rejection
pub fn error_page(code: u16, message: &str) -> String {
    format!(
        "HTTP/1.0 {code} {message}\r\n\
         Server: {SERVER_NAME}\r\n\
         Content-Type: text/html\r\n\
         \r\n\
         <html><body><h1>{code} {message}</h1></body></html>"
    )
}

/// Error response for a classified protocol rejection
pub fn rejection(err: &ProtocolError) -> String {
    error_page(err.status_code(), err.reason())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_ok_put_variant() {
        let response = source_ok(true, "audio/ogg");
        assert_eq!(
            response,
            format!(
                "HTTP/1.0 200 OK\r\nServer: {SERVER_NAME}\r\n\
                 Cache-Control: no-cache\r\nContent-Type: audio/ogg\r\n\r\n"
            )
        );
    }

    #[test]
    fn test_source_ok_legacy_variant() {
        let response = source_ok(false, "audio/mpeg");
        assert_eq!(
            response,
            "ICY 200 OK\r\nCache-Control: no-cache\r\nContent-Type: audio/mpeg\r\n\r\n"
        );
        assert!(!response.contains("Server:"));
    }

    #[test]
    fn test_listener_ok_header_order() {
        let meta = StreamMeta::default();
        let response = listener_ok(&meta, "/live", "http://localhost:8000", false);
        assert_eq!(
            response,
            format!(
                "HTTP/1.0 200 OK\r\n\
                 Server: {SERVER_NAME}\r\n\
                 Cache-Control: no-cache\r\n\
                 Pragma: no-cache\r\n\
                 Content-Type: audio/ogg\r\n\
                 icy-name: Untitled Stream\r\n\
                 icy-genre: Various\r\n\
                 icy-description: \r\n\
                 icy-pub: 1\r\n\
                 icy-br: 128\r\n\
                 icy-metaint: 0\r\n\
                 icy-url: http://localhost:8000/live\r\n\
                 Access-Control-Allow-Origin: *\r\n\
                 Access-Control-Allow-Headers: *\r\n\
                 Access-Control-Allow-Methods: GET, OPTIONS\r\n\
                 \r\n"
            )
        );
    }

    #[test]
    fn test_listener_ok_advertises_metaint_on_request() {
        let meta = StreamMeta::default();
        let with = listener_ok(&meta, "/live", "http://localhost:8000", true);
        assert!(with.contains("icy-metaint: 16384\r\n"));

        let without = listener_ok(&meta, "/live", "http://localhost:8000", false);
        assert!(without.contains("icy-metaint: 0\r\n"));
    }

    #[test]
    fn test_error_page_shape() {
        let response = error_page(404, "Not Found - Stream not available");
        assert_eq!(
            response,
            format!(
                "HTTP/1.0 404 Not Found - Stream not available\r\n\
                 Server: {SERVER_NAME}\r\n\
                 Content-Type: text/html\r\n\
                 \r\n\
                 <html><body><h1>404 Not Found - Stream not available</h1></body></html>"
            )
        );
    }

    #[test]
    fn test_rejection_maps_error() {
        let err = ProtocolError::NoLiveSource("/live".to_string());
        let response = rejection(&err);
        assert!(response.starts_with("HTTP/1.0 503 Service Unavailable - No source connected\r\n"));
        assert!(response.ends_with("</h1></body></html>"));
    }
}
