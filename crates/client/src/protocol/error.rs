use std::io;
use thiserror::Error;

/// Integer error codes surfaced through [`RequestError`].
///
/// Positive values follow Linux `errno` numbering so that codes reported by the operating
/// system pass through unchanged. Negative values are failures the library detects itself.
pub mod code {
    pub const BROKEN_PIPE: i32 = 32;
    pub const NETWORK_UNREACHABLE: i32 = 101;
    pub const CONNECTION_ABORTED: i32 = 103;
    pub const CONNECTION_RESET: i32 = 104;
    pub const TIMED_OUT: i32 = 110;
    pub const CONNECTION_REFUSED: i32 = 111;
    pub const HOST_UNREACHABLE: i32 = 113;

    pub const DNS_FAILURE: i32 = -2;
    pub const UNSUPPORTED_SCHEME: i32 = -3;
    pub const MALFORMED_RESPONSE: i32 = -100;
    pub const UNEXPECTED_EOF: i32 = -101;
}

/// The classified error handed to [`ResponseHandler::failure`](crate::handler::ResponseHandler::failure).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("connection error, code: {code}")]
    Connection { code: i32 },

    #[error("transport error, code: {code}")]
    Transport { code: i32 },

    #[error("protocol error, code: {code}")]
    Protocol { code: i32 },

    #[error("request cancelled")]
    Cancelled,
}

impl RequestError {
    /// Classifies an error code. Total over `i32`: codes without a dedicated class are
    /// reported as transport errors.
    pub fn from_code(code: i32) -> Self {
        match code {
            code::CONNECTION_REFUSED
            | code::NETWORK_UNREACHABLE
            | code::HOST_UNREACHABLE
            | code::DNS_FAILURE
            | code::UNSUPPORTED_SCHEME => Self::Connection { code },
            code::MALFORMED_RESPONSE => Self::Protocol { code },
            code => Self::Transport { code },
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Connection { code } | Self::Transport { code } | Self::Protocol { code } => Some(*code),
            Self::Cancelled => None,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failures in the connection's own domain, before classification.
#[derive(Debug, Error)]
pub enum ConnectionFailure {
    #[error("failed to resolve {host}: {reason}")]
    Dns { host: String, reason: String },

    #[error("unsupported scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("connect error: {source}")]
    Connect { source: io::Error },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("timed out while {phase}")]
    Timeout { phase: &'static str },

    #[error("malformed response: {source}")]
    Malformed { source: ParseError },

    #[error("connection closed before the response completed")]
    Closed,
}

impl ConnectionFailure {
    pub fn dns<H: ToString, S: ToString>(host: H, reason: S) -> Self {
        Self::Dns { host: host.to_string(), reason: reason.to_string() }
    }

    pub fn unsupported_scheme<S: ToString>(scheme: S) -> Self {
        Self::UnsupportedScheme { scheme: scheme.to_string() }
    }

    pub fn connect(source: io::Error) -> Self {
        Self::Connect { source }
    }

    pub fn timeout(phase: &'static str) -> Self {
        Self::Timeout { phase }
    }

    /// Maps this failure onto the integer table in [`code`].
    pub fn code(&self) -> i32 {
        match self {
            Self::Dns { .. } => code::DNS_FAILURE,
            Self::UnsupportedScheme { .. } => code::UNSUPPORTED_SCHEME,
            // a connect attempt that failed without an os error was still refused
            Self::Connect { source } => source.raw_os_error().unwrap_or_else(|| io_kind_code(source.kind(), code::CONNECTION_REFUSED)),
            Self::Io { source } => source.raw_os_error().unwrap_or_else(|| io_kind_code(source.kind(), code::CONNECTION_RESET)),
            Self::Timeout { .. } => code::TIMED_OUT,
            Self::Malformed { .. } => code::MALFORMED_RESPONSE,
            Self::Closed => code::UNEXPECTED_EOF,
        }
    }
}

impl From<ParseError> for ConnectionFailure {
    fn from(e: ParseError) -> Self {
        match e {
            // framing violations surface from the body decoders as invalid input
            ParseError::Io { source } if !matches!(source.kind(), io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData) => {
                Self::Io { source }
            }
            source => Self::Malformed { source },
        }
    }
}

impl From<SendError> for ConnectionFailure {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => Self::Io { source },
            SendError::InvalidBody { reason } => Self::Io { source: io::Error::new(io::ErrorKind::InvalidInput, reason) },
        }
    }
}

fn io_kind_code(kind: io::ErrorKind, fallback: i32) -> i32 {
    match kind {
        io::ErrorKind::ConnectionRefused => code::CONNECTION_REFUSED,
        io::ErrorKind::ConnectionReset => code::CONNECTION_RESET,
        io::ErrorKind::ConnectionAborted => code::CONNECTION_ABORTED,
        io::ErrorKind::BrokenPipe => code::BROKEN_PIPE,
        io::ErrorKind::TimedOut => code::TIMED_OUT,
        io::ErrorKind::UnexpectedEof => code::UNEXPECTED_EOF,
        io::ErrorKind::NetworkUnreachable => code::NETWORK_UNREACHABLE,
        io::ErrorKind::HostUnreachable => code::HOST_UNREACHABLE,
        _ => fallback,
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid status code: {0:?}")]
    InvalidStatus(Option<u16>),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("body size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeBody { current_size: u64, max_size: u64 },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn too_large_body(current_size: u64, max_size: u64) -> Self {
        Self::TooLargeBody { current_size, max_size }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
