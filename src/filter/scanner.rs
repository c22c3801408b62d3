//! Async scanner driving a filter over a reader

use std::borrow::Cow;
use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::Filter;
use crate::error::Error;

const READ_CHUNK: usize = 8 * 1024;

/// Token scanner over an async byte stream
///
/// `scan` advances to the next token and returns `false` once the stream is
/// exhausted or has failed; after that it keeps returning `false`. `err`
/// then distinguishes a clean end of stream (`None`) from a transport or
/// codec failure.
///
/// `scan` is cancel-safe: dropping the future loses no buffered input.
pub struct Scanner<R> {
    reader: R,
    filter: Box<dyn Filter>,
    buf: BytesMut,
    token: Bytes,
    eof: bool,
    done: bool,
    err: Option<Error>,
}

impl<R: AsyncRead + Unpin> Scanner<R> {
    /// Create a scanner reading from `reader` through `filter`
    pub fn new(reader: R, filter: Box<dyn Filter>) -> Self {
        Self {
            reader,
            filter,
            buf: BytesMut::with_capacity(READ_CHUNK),
            token: Bytes::new(),
            eof: false,
            done: false,
            err: None,
        }
    }

    /// Advance to the next token
    pub async fn scan(&mut self) -> bool {
        if self.done {
            return false;
        }

        loop {
            let decoded = if self.eof {
                self.filter.decode_eof(&mut self.buf)
            } else {
                self.filter.decode(&mut self.buf)
            };

            match decoded {
                Ok(Some(token)) => {
                    self.token = token;
                    return true;
                }
                Ok(None) if self.eof => return self.finish(None),
                Ok(None) => {}
                Err(e) => return self.finish(Some(e.into())),
            }

            self.buf.reserve(READ_CHUNK);
            match self.reader.read_buf(&mut self.buf).await {
                Ok(0) => self.eof = true,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return self.finish(Some(e.into())),
            }
        }
    }

    fn finish(&mut self, err: Option<Error>) -> bool {
        self.done = true;
        self.token = Bytes::new();
        self.err = err;
        false
    }

    /// Failure that ended the stream, or `None` for a clean end
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Current token; valid until the next `scan`
    pub fn bytes(&self) -> &[u8] {
        &self.token
    }

    /// Current token as text (lossy for non-UTF-8 input)
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.token)
    }

    /// Owned handle to the current token, safe to keep across scans
    pub fn token(&self) -> Bytes {
        self.token.clone()
    }

    /// Name of the underlying filter
    pub fn filter_name(&self) -> &'static str {
        self.filter.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::filter::FilterKind;

    fn scanner<R: AsyncRead + Unpin>(reader: R, kind: FilterKind) -> Scanner<R> {
        Scanner::new(reader, kind.build(1024))
    }

    #[tokio::test]
    async fn test_raw_across_chunks() {
        let reader = tokio_test::io::Builder::new()
            .read(b"PI")
            .read(b"NG\nPO")
            .read(b"NG\n")
            .build();
        let mut s = scanner(reader, FilterKind::Raw);

        assert!(s.scan().await);
        assert_eq!(s.bytes(), b"PING\n");
        assert!(s.scan().await);
        assert_eq!(s.text(), "PONG\n");
        assert!(!s.scan().await);
        assert!(s.err().is_none());
        assert!(s.bytes().is_empty());
    }

    #[tokio::test]
    async fn test_token_survives_next_scan() {
        let reader = tokio_test::io::Builder::new().read(b"a\nb\n").build();
        let mut s = scanner(reader, FilterKind::Raw);

        assert!(s.scan().await);
        let first = s.token();
        assert!(s.scan().await);
        assert_eq!(&first[..], b"a\n");
        assert_eq!(s.bytes(), b"b\n");
    }

    #[tokio::test]
    async fn test_read_error_reported() {
        let reader = tokio_test::io::Builder::new()
            .read(b"ok\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut s = scanner(reader, FilterKind::Raw);

        assert!(s.scan().await);
        assert!(!s.scan().await);
        assert!(matches!(s.err(), Some(Error::Io(e)) if e.kind() == io::ErrorKind::ConnectionReset));
        // Latched
        assert!(!s.scan().await);
    }

    #[tokio::test]
    async fn test_codec_error_ends_stream() {
        let reader = tokio_test::io::Builder::new()
            .read(b"PING :a\r\n:only-a-prefix\r\nPING :b\r\n")
            .build();
        let mut s = scanner(reader, FilterKind::IrcToJson);

        assert!(s.scan().await);
        assert!(!s.scan().await);
        assert!(matches!(s.err(), Some(Error::Filter(FilterError::Irc(_)))));
    }

    #[tokio::test]
    async fn test_json_to_irc_over_reader() {
        let reader = tokio_test::io::Builder::new()
            .read(br#"{"command":"NICK","par"#)
            .read(br#"ams":["rusty"]}"#)
            .read(b"\n")
            .build();
        let mut s = scanner(reader, FilterKind::JsonToIrc);

        assert!(s.scan().await);
        assert_eq!(s.bytes(), b"NICK rusty\r\n");
        assert!(!s.scan().await);
        assert!(s.err().is_none());
        assert_eq!(s.filter_name(), "jsontoirc");
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let reader = tokio_test::io::Builder::new().build();
        let mut s = scanner(reader, FilterKind::IrcToJson);
        assert!(!s.scan().await);
        assert!(s.err().is_none());
    }
}
