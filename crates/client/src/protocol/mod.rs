//! Core HTTP protocol types for the client.
//!
//! # Architecture
//!
//! - **Message Handling** ([`message`]): Core message types and payload processing
//!   - [`Message`]: Represents either headers or payload chunks
//!   - [`PayloadItem`]: Handles individual payload chunks and EOF
//!   - [`PayloadSize`]: Tracks payload framing information
//!
//! - **Request Description** ([`request`]):
//!   - [`RequestDescriptor`]: Immutable method, target, headers and body
//!   - [`RequestHead`]: Request head handed to the encoder
//!
//! - **Responses** ([`response`]):
//!   - [`ResponseHead`]: Decoded response head before the body is attached
//!   - [`ClientResponse`]: Complete response delivered to handlers
//!
//! - **Error Handling** ([`error`]):
//!   - [`RequestError`]: Classified error delivered to handlers
//!   - [`ConnectionFailure`]: Failures in the connection's own domain
//!   - [`ParseError`]: Response parsing errors
//!   - [`SendError`]: Request sending errors
//!   - [`code`]: The integer error code table

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestDescriptor;
pub use request::RequestHead;

mod response;
pub use response::ClientResponse;
pub use response::ResponseHead;
pub use response::is_keep_alive;

mod error;
pub use error::ConnectionFailure;
pub use error::ParseError;
pub use error::RequestError;
pub use error::SendError;
pub use error::code;
