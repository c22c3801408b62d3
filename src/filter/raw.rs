//! Raw passthrough filter

use bytes::{Bytes, BytesMut};

use super::Filter;
use crate::error::FilterError;

/// Newline framing with no transcoding
///
/// Tokens keep their trailing `\n` so that relaying is byte-exact. Whatever
/// is left unterminated at end of stream becomes a final token.
#[derive(Debug)]
pub struct RawFilter {
    max_token_size: usize,
}

impl RawFilter {
    pub fn new(max_token_size: usize) -> Self {
        Self { max_token_size }
    }
}

impl Filter for RawFilter {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FilterError> {
        match buf.iter().position(|&b| b == b'\n') {
            Some(i) if i + 1 > self.max_token_size => {
                Err(FilterError::TokenTooLong(self.max_token_size))
            }
            Some(i) => Ok(Some(buf.split_to(i + 1).freeze())),
            None if buf.len() >= self.max_token_size => {
                Err(FilterError::TokenTooLong(self.max_token_size))
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FilterError> {
        if let Some(token) = self.decode(buf)? {
            return Ok(Some(token));
        }
        if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some(buf.split().freeze()))
        }
    }
}
