//! Decoder for response bodies sent with chunked transfer encoding.
//!
//! refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-chunked-transfer-coding>
//!
//! Chunk extensions and trailer fields are validated for framing only and then dropped.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Decoder;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// hex digits of the chunk size
    Size,
    /// whitespace between size and extension or line end
    SizeLws,
    Extension,
    SizeLf,
    Data,
    DataCr,
    DataLf,
    /// start of a trailer line, or the final empty line
    TrailerStart,
    Trailer,
    TrailerLf,
    EndLf,
    Done,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, remaining: 0 }
    }

    fn invalid(reason: &'static str) -> ParseError {
        ParseError::io(io::Error::new(ErrorKind::InvalidInput, reason))
    }

    fn push_size_digit(&mut self, digit: u8) -> Result<(), ParseError> {
        self.remaining = self
            .remaining
            .checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or_else(|| Self::invalid("chunk size overflow"))?;
        Ok(())
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == State::Done {
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            if self.state == State::Data {
                let len = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(src.len());
                let bytes = src.split_to(len).freeze();
                self.remaining -= len as u64;
                if self.remaining == 0 {
                    self.state = State::DataCr;
                }
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }

            let byte = src.get_u8();
            self.state = match (self.state, byte) {
                (State::Size, b @ b'0'..=b'9') => {
                    self.push_size_digit(b - b'0')?;
                    State::Size
                }
                (State::Size, b @ b'a'..=b'f') => {
                    self.push_size_digit(b - b'a' + 10)?;
                    State::Size
                }
                (State::Size, b @ b'A'..=b'F') => {
                    self.push_size_digit(b - b'A' + 10)?;
                    State::Size
                }
                (State::Size | State::SizeLws, b'\t' | b' ') => State::SizeLws,
                (State::Size | State::SizeLws, b';') => State::Extension,
                (State::Size | State::SizeLws | State::Extension, b'\r') => State::SizeLf,
                (State::Size, _) => return Err(Self::invalid("invalid chunk size")),
                (State::SizeLws, _) => return Err(Self::invalid("invalid chunk size linear white space")),
                // a bare LF inside an extension would desync lenient peers
                (State::Extension, b'\n') => return Err(Self::invalid("invalid chunk extension contains newline")),
                (State::Extension, _) => State::Extension,
                (State::SizeLf, b'\n') if self.remaining == 0 => State::TrailerStart,
                (State::SizeLf, b'\n') => State::Data,
                (State::SizeLf, _) => return Err(Self::invalid("invalid chunk size LF")),
                (State::DataCr, b'\r') => State::DataLf,
                (State::DataCr, _) => return Err(Self::invalid("invalid chunk body CR")),
                (State::DataLf, b'\n') => State::Size,
                (State::DataLf, _) => return Err(Self::invalid("invalid chunk body LF")),
                (State::TrailerStart, b'\r') => State::EndLf,
                (State::Trailer, b'\r') => State::TrailerLf,
                (State::TrailerStart | State::Trailer, _) => State::Trailer,
                (State::TrailerLf, b'\n') => State::TrailerStart,
                (State::TrailerLf, _) => return Err(Self::invalid("invalid trailer end LF")),
                (State::EndLf, b'\n') => State::Done,
                (State::EndLf, _) => return Err(Self::invalid("invalid chunk end LF")),
                (State::Data | State::Done, _) => unreachable!("handled before reading a byte"),
            };
        }
    }
}
