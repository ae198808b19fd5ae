//! HTTP body handling for requests and responses
//!
//! # Components
//!
//! ## Decoders (response side)
//! - [`ChunkedDecoder`]: Handles chunked transfer encoded payloads
//! - [`LengthDecoder`]: Processes fixed-length payloads
//! - [`UntilCloseDecoder`]: Reads until the server closes the connection
//! - [`PayloadDecoder`]: Main decoder that selects between the strategies
//!
//! ## Encoders (request side)
//! - [`LengthEncoder`]: Handles fixed-length payload encoding
//! - [`PayloadEncoder`]: Main encoder over fixed-length and empty payloads

mod chunked_decoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;
mod until_close_decoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
