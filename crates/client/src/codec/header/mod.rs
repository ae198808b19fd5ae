//! HTTP head processing for the client side of an exchange
//!
//! # Components
//!
//! - [`HeaderEncoder`]: Encodes the request line and header fields of outgoing requests
//!   - Fills in `host`, `user-agent` and body framing headers
//!
//! - [`HeaderDecoder`]: Decodes response status lines and header fields
//!   - Enforces header size and count limits
//!   - Selects the payload framing of the response body

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
