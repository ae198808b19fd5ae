//! HTTP response types delivered to handlers.
//!
//! The decoder produces a [`ResponseHead`] followed by payload items; the connection
//! aggregates them into a complete [`ClientResponse`] before any handler sees it.

use bytes::Bytes;
use http::{Response, Version, header};

/// Type alias for HTTP response headers before the body is attached.
pub type ResponseHead = Response<()>;

/// A complete, fully buffered response.
pub type ClientResponse = Response<Bytes>;

/// Decides whether the connection may carry another exchange after this response.
///
/// HTTP/1.1 defaults to persistent connections unless `connection: close` is present;
/// HTTP/1.0 requires an explicit `connection: keep-alive`.
pub fn is_keep_alive(head: &ResponseHead) -> bool {
    let connection = head.headers().get(header::CONNECTION).map(|value| value.as_bytes());
    let has_token = |token: &[u8]| {
        connection.is_some_and(|value| value.split(|b| *b == b',').any(|part| part.trim_ascii().eq_ignore_ascii_case(token)))
    };

    match head.version() {
        Version::HTTP_11 => !has_token(b"close"),
        Version::HTTP_10 => has_token(b"keep-alive"),
        _ => false,
    }
}
