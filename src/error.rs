//! Error types
//!
//! Errors are split by where they originate: transport (`Io`, `Tls`),
//! stream filters (`Filter`), and startup/configuration (`ConnectTimeout`,
//! `InvalidServerName`, `Config`).

use std::fmt;
use std::io;
use std::time::Duration;

use crate::irc::IrcError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket read/write or bind failure
    Io(io::Error),
    /// A filter could not frame or transcode the stream
    Filter(FilterError),
    /// TLS session setup failed
    Tls(rustls::Error),
    /// The upstream host cannot be used as a TLS server name
    InvalidServerName(String),
    /// The upstream did not accept the connection in time
    ConnectTimeout(Duration),
    /// Invalid configuration
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Filter(e) => write!(f, "Filter error: {}", e),
            Error::Tls(e) => write!(f, "TLS error: {}", e),
            Error::InvalidServerName(host) => write!(f, "Invalid TLS server name: {}", host),
            Error::ConnectTimeout(timeout) => {
                write!(f, "Connect timed out after {}s", timeout.as_secs())
            }
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Filter(e) => Some(e),
            Error::Tls(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<FilterError> for Error {
    fn from(e: FilterError) -> Self {
        Error::Filter(e)
    }
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Error::Tls(e)
    }
}

/// Codec-level failure inside a filter
///
/// Any of these ends the filter's stream; the owning pump treats it like a
/// transport error.
#[derive(Debug)]
pub enum FilterError {
    /// No token boundary found within the configured maximum size
    TokenTooLong(usize),
    /// IRC parse or marshal failure
    Irc(IrcError),
    /// Malformed JSON document
    Json(serde_json::Error),
    /// Stream ended in the middle of a token
    UnexpectedEof,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::TokenTooLong(max) => write!(f, "token too long (max {} bytes)", max),
            FilterError::Irc(e) => write!(f, "{}", e),
            FilterError::Json(e) => write!(f, "invalid JSON: {}", e),
            FilterError::UnexpectedEof => write!(f, "unexpected end of stream"),
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FilterError::Irc(e) => Some(e),
            FilterError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IrcError> for FilterError {
    fn from(e: IrcError) -> Self {
        FilterError::Irc(e)
    }
}

impl From<serde_json::Error> for FilterError {
    fn from(e: serde_json::Error) -> Self {
        FilterError::Json(e)
    }
}

/// Unknown filter name given in configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFilter(pub String);

impl fmt::Display for UnknownFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown filter: {}", self.0)
    }
}

impl std::error::Error for UnknownFilter {}

impl From<UnknownFilter> for Error {
    fn from(e: UnknownFilter) -> Self {
        Error::Config(e.to_string())
    }
}
