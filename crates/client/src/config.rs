//! Client configuration.
//!
//! ```
//! use std::time::Duration;
//! use micro_http_client::config::ClientConfig;
//!
//! let config = ClientConfig::builder()
//!     .max_connections_per_host(2)
//!     .response_timeout(Duration::from_secs(30))
//!     .user_agent("inventory-sync/2.1")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.max_connections_per_host(), 2);
//! ```

use std::time::Duration;

use http::HeaderValue;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = 4;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_BUFFER_CAPACITY: usize = 8 * 1024;
pub(crate) const DEFAULT_MAX_RESPONSE_BODY: u64 = 16 * 1024 * 1024;
const DEFAULT_USER_AGENT: &str = concat!("micro-http-client/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ClientConfig {
    max_connections_per_host: usize,
    connect_timeout: Duration,
    response_timeout: Option<Duration>,
    read_buffer_capacity: usize,
    max_response_body: u64,
    user_agent: Option<HeaderValue>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Upper bound of open connections to one authority. Requests beyond it wait in FIFO order.
    pub fn max_connections_per_host(&self) -> usize {
        self.max_connections_per_host
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Bound on the wait for a complete response once the request was written, none by default.
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout
    }

    pub fn read_buffer_capacity(&self) -> usize {
        self.read_buffer_capacity
    }

    /// Largest response body buffered for a handler; longer responses fail as malformed.
    pub fn max_response_body(&self) -> u64 {
        self.max_response_body
    }

    pub fn user_agent(&self) -> Option<&HeaderValue> {
        self.user_agent.as_ref()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: None,
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
            max_response_body: DEFAULT_MAX_RESPONSE_BODY,
            user_agent: Some(HeaderValue::from_static(DEFAULT_USER_AGENT)),
        }
    }
}

#[derive(Debug)]
pub struct ClientConfigBuilder {
    max_connections_per_host: usize,
    connect_timeout: Duration,
    response_timeout: Option<Duration>,
    read_buffer_capacity: usize,
    max_response_body: u64,
    user_agent: Option<String>,
}

impl ClientConfigBuilder {
    fn new() -> Self {
        Self {
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: None,
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
            max_response_body: DEFAULT_MAX_RESPONSE_BODY,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
        }
    }

    pub fn max_connections_per_host(mut self, max: usize) -> Self {
        self.max_connections_per_host = max;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    pub fn read_buffer_capacity(mut self, capacity: usize) -> Self {
        self.read_buffer_capacity = capacity;
        self
    }

    pub fn max_response_body(mut self, max: u64) -> Self {
        self.max_response_body = max;
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sends requests without a `user-agent` unless the request carries its own.
    pub fn no_user_agent(mut self) -> Self {
        self.user_agent = None;
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        if self.max_connections_per_host == 0 {
            return Err(ConfigError::ZeroConnections);
        }
        if self.read_buffer_capacity == 0 {
            return Err(ConfigError::ZeroReadBuffer);
        }

        let user_agent = self
            .user_agent
            .map(|user_agent| HeaderValue::try_from(user_agent.as_str()).map_err(|_| ConfigError::InvalidUserAgent { user_agent }))
            .transpose()?;

        Ok(ClientConfig {
            max_connections_per_host: self.max_connections_per_host,
            connect_timeout: self.connect_timeout,
            response_timeout: self.response_timeout,
            read_buffer_capacity: self.read_buffer_capacity,
            max_response_body: self.max_response_body,
            user_agent,
        })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max connections per host must be at least 1")]
    ZeroConnections,
    #[error("read buffer capacity must be at least 1 byte")]
    ZeroReadBuffer,
    #[error("invalid user agent: {user_agent:?}")]
    InvalidUserAgent { user_agent: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::builder().build().unwrap();
        assert_eq!(config.max_connections_per_host(), 4);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.response_timeout(), None);
        assert_eq!(config.read_buffer_capacity(), 8 * 1024);
        assert_eq!(config.max_response_body(), 16 * 1024 * 1024);
        assert!(config.user_agent().unwrap().to_str().unwrap().starts_with("micro-http-client/"));

        let default = ClientConfig::default();
        assert_eq!(default.max_connections_per_host(), config.max_connections_per_host());
        assert_eq!(default.user_agent(), config.user_agent());
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(ClientConfig::builder().max_connections_per_host(0).build().unwrap_err(), ConfigError::ZeroConnections);
        assert_eq!(ClientConfig::builder().read_buffer_capacity(0).build().unwrap_err(), ConfigError::ZeroReadBuffer);
        assert!(matches!(
            ClientConfig::builder().user_agent("bad\nagent").build(),
            Err(ConfigError::InvalidUserAgent { .. })
        ));
    }

    #[test]
    fn response_body_limit() {
        let config = ClientConfig::builder().max_response_body(1024).build().unwrap();
        assert_eq!(config.max_response_body(), 1024);
    }

    #[test]
    fn without_user_agent() {
        let config = ClientConfig::builder().no_user_agent().build().unwrap();
        assert!(config.user_agent().is_none());
    }
}
