//! HTTP header encoder implementation for serializing HTTP request heads
//!
//! This module serializes the request line and header fields of an outgoing request.
//! It fills in the headers a client is responsible for: `host` derived from the target
//! authority, the configured `user-agent`, and `content-length` derived from the payload
//! size.
//!
//! The request target is always sent in origin-form (`/path?query`), since the client
//! talks to origin servers directly.

use crate::protocol::{PayloadSize, RequestHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderValue, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

/// Encoder for HTTP request heads implementing the [`Encoder`] trait.
#[derive(Debug, Clone)]
pub struct HeaderEncoder {
    user_agent: Option<HeaderValue>,
}

impl HeaderEncoder {
    pub fn new(user_agent: Option<HeaderValue>) -> Self {
        Self { user_agent }
    }
}

impl Encoder<(RequestHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    /// Encodes the request line and headers into the provided bytes buffer.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - HTTP version is not HTTP/1.1
    /// - The target URI has no authority and no `host` header was supplied
    fn encode(&mut self, item: (RequestHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        if head.version() != Version::HTTP_11 {
            error!(http_version = ?head.version(), "unsupported http version");
            return Err(io::Error::from(ErrorKind::Unsupported).into());
        }

        let target = head.uri().path_and_query().map_or("/", |path_and_query| path_and_query.as_str());

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{} {} HTTP/1.1\r\n", head.method().as_str(), target)?;

        if !head.headers().contains_key(header::HOST) {
            let authority = head.uri().authority().ok_or_else(|| {
                error!(uri = %head.uri(), "request target has no authority");
                io::Error::new(ErrorKind::InvalidInput, "request target has no authority")
            })?;
            let host = HeaderValue::from_str(authority.as_str()).map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
            head.headers_mut().insert(header::HOST, host);
        }

        if let Some(user_agent) = &self.user_agent {
            if !head.headers().contains_key(header::USER_AGENT) {
                head.headers_mut().insert(header::USER_AGENT, user_agent.clone());
            }
        }

        match payload_size {
            PayloadSize::Length(n) => {
                head.headers_mut().remove(header::TRANSFER_ENCODING);
                head.headers_mut().insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                head.headers_mut().remove(header::CONTENT_LENGTH);
                head.headers_mut().insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            // requests without a body must not announce one
            PayloadSize::Empty | PayloadSize::UntilClose => {
                head.headers_mut().remove(header::CONTENT_LENGTH);
                head.headers_mut().remove(header::TRANSFER_ENCODING);
            }
        }

        for (header_name, header_value) in head.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Writer adapter so `write!` can format straight into a `BytesMut`.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
