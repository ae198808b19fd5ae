use http::Uri;
use thiserror::Error;

/// Errors returned synchronously by [`Client::request`](crate::client::Client::request).
///
/// Failures of the exchange itself never show up here; they reach the request's handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("invalid request target {uri}: {reason}")]
    InvalidUri { uri: String, reason: &'static str },

    #[error("client is shut down")]
    Shutdown,
}

impl ClientError {
    pub fn invalid_uri(uri: &Uri, reason: &'static str) -> Self {
        Self::InvalidUri { uri: uri.to_string(), reason }
    }
}
