//! HTTP/1.1 codec for the client side of an exchange
//!
//! - [`RequestEncoder`]: encodes a request head and its payload
//! - [`ResponseDecoder`]: decodes a response head and streams its payload
//!
//! Both plug into `tokio_util::codec::{FramedWrite, FramedRead}`; the connection layer
//! aggregates decoded items into complete responses.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_http_client::codec::ResponseDecoder;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = ResponseDecoder::new();
//! let mut buffer = BytesMut::from(&b"HTTP/1.1 204 No Content\r\n\r\n"[..]);
//! let head = decoder.decode(&mut buffer).unwrap();
//! assert!(head.is_some_and(|message| message.is_header()));
//! ```

mod body;
mod header;
mod request_encoder;
mod response_decoder;

pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
