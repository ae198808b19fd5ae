use std::fmt;

use http::Uri;

use crate::client::ClientError;

/// The `(scheme, host, port)` triple connections are pooled by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Authority {
    scheme: String,
    host: String,
    port: u16,
}

impl Authority {
    /// Extracts the authority of an absolute request target.
    ///
    /// The port defaults from the scheme for `http` and `https`; any other scheme must
    /// name its port. Whether a scheme can actually be served is up to the connection.
    pub fn from_uri(uri: &Uri) -> Result<Self, ClientError> {
        let scheme = uri.scheme_str().ok_or_else(|| ClientError::invalid_uri(uri, "missing scheme"))?.to_ascii_lowercase();
        let host = uri.host().filter(|host| !host.is_empty()).ok_or_else(|| ClientError::invalid_uri(uri, "missing host"))?;

        let port = match (uri.port_u16(), scheme.as_str()) {
            (Some(port), _) => port,
            (None, "http") => 80,
            (None, "https") => 443,
            (None, _) => return Err(ClientError::invalid_uri(uri, "missing port")),
        };

        Ok(Self { scheme, host: host.to_ascii_lowercase(), port })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host as written in the URI, IPv6 literals keep their brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The host in the form name resolution expects.
    pub fn resolvable_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}
