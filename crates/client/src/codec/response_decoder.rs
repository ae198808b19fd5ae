//! HTTP response decoder module
//!
//! Decodes responses in two phases through a small state machine:
//! 1. Head parsing with [`HeaderDecoder`]
//! 2. Payload parsing with [`PayloadDecoder`], selected from the head
//!
//! The decoder must be told which request method the next response answers, since
//! responses to `HEAD` carry no body even when they announce a length.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, ResponseHead};
use bytes::BytesMut;
use http::Method;
use tokio_util::codec::Decoder;

/// A decoder for HTTP responses that handles both head and payload
///
/// # State Machine
///
/// - `payload_decoder == None`: currently parsing a head
/// - `payload_decoder == Some(_)`: currently parsing that response's payload
#[derive(Debug)]
pub struct ResponseDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares for the response to a request sent with `method`.
    pub fn expect_response_to(&mut self, method: Method) {
        self.header_decoder.expect_response_to(method);
    }

    /// Returns true while a response payload is partially decoded.
    pub fn in_payload(&self) -> bool {
        self.payload_decoder.is_some()
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder::new(), payload_decoder: None }
    }
}

impl ResponseDecoder {
    fn on_payload(&mut self, item: Option<PayloadItem>) -> Option<Message<(ResponseHead, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
            Some(item @ PayloadItem::Eof) => {
                self.payload_decoder.take();
                Some(Message::Payload(item))
            }
            None => None,
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.on_payload(item));
        }

        let message = match self.header_decoder.decode(src)? {
            Some((head, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.on_payload(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::invalid_header("connection closed inside a response head")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;

    fn next(decoder: &mut ResponseDecoder, buf: &mut BytesMut) -> Message<(ResponseHead, PayloadSize)> {
        decoder.decode(buf).unwrap().unwrap()
    }

    #[test]
    fn two_responses_back_to_back() {
        let mut buf =
            BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOKHTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n"[..]);
        let mut decoder = ResponseDecoder::new();

        let Message::Header((head, size)) = next(&mut decoder, &mut buf) else { panic!("expect head") };
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(size, PayloadSize::Length(2));

        let Message::Payload(PayloadItem::Chunk(bytes)) = next(&mut decoder, &mut buf) else { panic!("expect chunk") };
        assert_eq!(bytes, Bytes::from_static(b"OK"));
        assert!(matches!(next(&mut decoder, &mut buf), Message::Payload(PayloadItem::Eof)));
        assert!(!decoder.in_payload());

        let Message::Header((head, size)) = next(&mut decoder, &mut buf) else { panic!("expect head") };
        assert_eq!(head.status(), StatusCode::CREATED);
        assert!(size.is_empty());
        assert!(matches!(next(&mut decoder, &mut buf), Message::Payload(PayloadItem::Eof)));
        assert!(buf.is_empty());
    }

    #[test]
    fn close_delimited_body() {
        let mut buf = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\nhello"[..]);
        let mut decoder = ResponseDecoder::new();

        assert!(next(&mut decoder, &mut buf).is_header());
        assert!(next(&mut decoder, &mut buf).is_payload());
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(matches!(decoder.decode_eof(&mut buf).unwrap(), Some(Message::Payload(PayloadItem::Eof))));
    }

    #[test]
    fn close_inside_head_is_an_error() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-"[..]);
        let mut decoder = ResponseDecoder::new();

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.decode_eof(&mut buf).is_err());
    }
}
