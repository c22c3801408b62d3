//! Stream filters
//!
//! A filter frames a byte stream into discrete tokens and may transcode each
//! token on the way. Filters are sans-io: they only ever look at a
//! `BytesMut` read buffer. [`Scanner`] couples a filter with an async reader
//! and exposes the `scan`/`err`/`bytes` contract the relay pumps consume.
//!
//! | Name        | Input                      | Token                            |
//! |-------------|----------------------------|----------------------------------|
//! | `raw`       | newline-delimited bytes    | the line, `\n` included          |
//! | `irctojson` | IRC lines (`\r\n` or `\n`) | one JSON document + `\n`         |
//! | `jsontoirc` | concatenated JSON docs     | one IRC line + canonical `\r\n`  |
//!
//! Each filter instance holds per-stream state and is never shared between
//! streams.

pub mod irc;
pub mod raw;
pub mod scanner;

use std::fmt;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};

use crate::error::{FilterError, UnknownFilter};

pub use irc::{IrcToJson, JsonToIrc};
pub use raw::RawFilter;
pub use scanner::Scanner;

/// Largest token a filter buffers before giving up (64 KiB)
pub const DEFAULT_MAX_TOKEN_SIZE: usize = 64 * 1024;

/// Framing and transcoding over a read buffer
pub trait Filter: Send {
    /// Filter name as used in configuration
    fn name(&self) -> &'static str;

    /// Extract the next token from the front of `buf`
    ///
    /// Returns `Ok(None)` when more input is needed. Consumed bytes are
    /// removed from `buf`; the returned token does not alias `buf`.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FilterError>;

    /// Extract the next token once the input has ended
    ///
    /// Called repeatedly until it returns `Ok(None)`. The default treats any
    /// leftover bytes as a truncated token.
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FilterError> {
        match self.decode(buf)? {
            Some(token) => Ok(Some(token)),
            None if buf.is_empty() => Ok(None),
            None => Err(FilterError::UnexpectedEof),
        }
    }
}

/// Name-to-constructor mapping for filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    /// Identity framing
    #[default]
    Raw,
    /// Decode IRC wire lines into JSON documents
    IrcToJson,
    /// Encode JSON documents into IRC wire lines
    JsonToIrc,
}

impl FilterKind {
    /// Every known filter, in the order they are listed to users
    pub const ALL: [FilterKind; 3] = [FilterKind::Raw, FilterKind::IrcToJson, FilterKind::JsonToIrc];

    /// Configuration name of this filter
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Raw => "raw",
            FilterKind::IrcToJson => "irctojson",
            FilterKind::JsonToIrc => "jsontoirc",
        }
    }

    /// All configuration names
    pub fn names() -> impl Iterator<Item = &'static str> {
        Self::ALL.iter().map(|kind| kind.name())
    }

    /// Construct a fresh filter instance for one stream
    pub fn build(&self, max_token_size: usize) -> Box<dyn Filter> {
        match self {
            FilterKind::Raw => Box::new(RawFilter::new(max_token_size)),
            FilterKind::IrcToJson => Box::new(IrcToJson::new(max_token_size)),
            FilterKind::JsonToIrc => Box::new(JsonToIrc::new(max_token_size)),
        }
    }
}

impl FromStr for FilterKind {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownFilter(s.to_string()))
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
