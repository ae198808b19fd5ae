//! HTTP header decoder implementation for parsing HTTP response heads
//!
//! This module decodes the status line and header fields of a response from raw bytes
//! into an [`http::Response<()>`], and selects the payload framing for the body that
//! follows according to RFC 9112 section 6.3.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - Only supports HTTP/1.0 and HTTP/1.1
//!
//! The decoder records the byte ranges of header names and values, then slices them out
//! of the frozen head buffer, so header values share memory with the read buffer.

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Method, Response, StatusCode};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, ResponseHead};

/// Maximum number of headers allowed in a response
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for HTTP response heads.
///
/// The framing of a response body depends on the request that solicited it: a response
/// to `HEAD` never has a body regardless of its headers. The decoder therefore carries
/// the method of the request currently awaiting its response.
#[derive(Debug, Clone)]
pub struct HeaderDecoder {
    request_method: Method,
}

impl HeaderDecoder {
    pub fn new() -> Self {
        Self { request_method: Method::GET }
    }

    /// Sets the method of the request whose response is decoded next.
    pub fn expect_response_to(&mut self, method: Method) {
        self.request_method = method;
    }
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for HeaderDecoder {
    type Item = (ResponseHead, PayloadSize);
    type Error = ParseError;

    /// Attempts to decode a response head from the provided bytes buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((head, payload_size)))` if a complete head was parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if parsing failed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // shortest status line: "HTTP/1.1 200 \r\n\r\n"
        if src.len() < 16 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut resp = httparse::Response::new(&mut headers);

        let parsed_result = resp.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(body_offset) => {
                trace!(head_size = body_offset, "parsed response head");
                ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

                let version = match resp.version {
                    Some(0) => http::Version::HTTP_10,
                    Some(1) => http::Version::HTTP_11,
                    _ => return Err(ParseError::InvalidVersion(resp.version)),
                };

                let status = resp.code.and_then(|code| StatusCode::from_u16(code).ok()).ok_or(ParseError::InvalidStatus(resp.code))?;

                let header_count = resp.headers.len();
                let mut header_index = [HeaderIndex::EMPTY; MAX_HEADER_NUM];
                HeaderIndex::record(src, resp.headers, &mut header_index);

                let mut head = Response::new(());
                *head.status_mut() = status;
                *head.version_mut() = version;
                head.headers_mut().reserve(header_count);

                let head_bytes = src.split_to(body_offset).freeze();
                for index in &header_index[..header_count] {
                    let name = HeaderName::from_bytes(&head_bytes[index.name.0..index.name.1]).map_err(ParseError::invalid_header)?;
                    let value = HeaderValue::from_maybe_shared(head_bytes.slice(index.value.0..index.value.1))
                        .map_err(ParseError::invalid_header)?;
                    head.headers_mut().append(name, value);
                }

                let payload_size = parse_payload(&head, &self.request_method)?;
                Ok(Some((head, payload_size)))
            }
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}

/// Byte range positions of a header's name and value within the head buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    const EMPTY: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            indices.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            indices.value = (value_start, value_start + header.value.len());
        }
    }
}

/// Determines the payload framing of a response.
///
/// refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length>
fn parse_payload(head: &ResponseHead, request_method: &Method) -> Result<PayloadSize, ParseError> {
    let status = head.status();
    if *request_method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(PayloadSize::new_empty());
    }

    let te_header = head.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = head.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::new_until_close()),

        (Some(te_value), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::new_chunked())
            } else {
                Ok(PayloadSize::new_until_close())
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;

            let length =
                cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            if length == 0 { Ok(PayloadSize::new_empty()) } else { Ok(PayloadSize::new_length(length)) }
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// Chunked must be the final transfer coding when present.
fn is_chunked(value: &HeaderValue) -> bool {
    value.as_bytes().rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Version};
    use indoc::indoc;

    fn crlf(text: &str) -> BytesMut {
        BytesMut::from(text.replace('\n', "\r\n").as_str())
    }

    #[test]
    fn check_is_chunked() {
        let mut headers = HeaderMap::new();
        headers.insert("Transfer-Encoding", "gzip, chunked".parse().unwrap());
        assert!(is_chunked(headers.get(http::header::TRANSFER_ENCODING).unwrap()));

        headers.insert("Transfer-Encoding", "chunked, gzip".parse().unwrap());
        assert!(!is_chunked(headers.get(http::header::TRANSFER_ENCODING).unwrap()));

        headers.insert("Transfer-Encoding", "Chunked".parse().unwrap());
        assert!(is_chunked(headers.get(http::header::TRANSFER_ENCODING).unwrap()));
    }

    #[test]
    fn status_with_length() {
        let mut buf = crlf(indoc! {"
        HTTP/1.1 200 OK
        Content-Type: text/plain
        Content-Length: 2

        OK"});

        let (head, payload_size) = HeaderDecoder::new().decode(&mut buf).unwrap().unwrap();

        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(head.headers().len(), 2);
        assert_eq!(head.headers().get(http::header::CONTENT_TYPE), Some(&HeaderValue::from_static("text/plain")));
        assert_eq!(payload_size, PayloadSize::Length(2));
        assert_eq!(&buf[..], b"OK");
    }

    #[test]
    fn partial_head_needs_more() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n"[..]);
        assert!(HeaderDecoder::new().decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 36);
    }

    #[test]
    fn framing_modes() {
        let mut chunked = crlf("HTTP/1.1 200 OK\nTransfer-Encoding: chunked\n\n");
        let (_, size) = HeaderDecoder::new().decode(&mut chunked).unwrap().unwrap();
        assert!(size.is_chunked());

        let mut close_delimited = crlf("HTTP/1.0 200 OK\nServer: legacy\n\n");
        let (head, size) = HeaderDecoder::new().decode(&mut close_delimited).unwrap().unwrap();
        assert_eq!(head.version(), Version::HTTP_10);
        assert!(size.is_until_close());

        let mut no_content = crlf("HTTP/1.1 204 No Content\nContent-Length: 10\n\n");
        let (_, size) = HeaderDecoder::new().decode(&mut no_content).unwrap().unwrap();
        assert!(size.is_empty());
    }

    #[test]
    fn head_response_has_no_body() {
        let mut buf = crlf("HTTP/1.1 200 OK\nContent-Length: 1024\n\n");
        let mut decoder = HeaderDecoder::new();
        decoder.expect_response_to(Method::HEAD);

        let (_, size) = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(size.is_empty());
    }

    #[test]
    fn conflicting_framing_is_rejected() {
        let mut buf = crlf("HTTP/1.1 200 OK\nContent-Length: 3\nTransfer-Encoding: chunked\n\n");
        assert!(matches!(HeaderDecoder::new().decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut buf = BytesMut::from(&b"SMTP ready for you, friend\r\n\r\n"[..]);
        assert!(HeaderDecoder::new().decode(&mut buf).is_err());
    }
}
