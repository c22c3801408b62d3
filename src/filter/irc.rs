//! IRC transcoding filters
//!
//! [`IrcToJson`] turns IRC wire lines into newline-delimited JSON documents;
//! [`JsonToIrc`] does the reverse. The asymmetry matters for protocol
//! correctness: decoding drops whatever terminator the line had, encoding
//! always appends `\r\n`.

use bytes::{Buf, Bytes, BytesMut};

use super::Filter;
use crate::error::FilterError;
use crate::irc::{split_line, IrcMessage, LINE_TERMINATOR};

/// Decode filter: IRC wire → JSON
#[derive(Debug)]
pub struct IrcToJson {
    max_token_size: usize,
}

impl IrcToJson {
    pub fn new(max_token_size: usize) -> Self {
        Self { max_token_size }
    }

    fn encode_line(line: &[u8]) -> Result<Bytes, FilterError> {
        let msg = IrcMessage::parse_bytes(line)?;
        let mut out = serde_json::to_vec(&msg)?;
        out.push(b'\n');
        Ok(Bytes::from(out))
    }
}

impl Filter for IrcToJson {
    fn name(&self) -> &'static str {
        "irctojson"
    }

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FilterError> {
        loop {
            let Some((line_len, consumed)) = split_line(buf) else {
                if buf.len() >= self.max_token_size {
                    return Err(FilterError::TokenTooLong(self.max_token_size));
                }
                return Ok(None);
            };
            if consumed > self.max_token_size {
                return Err(FilterError::TokenTooLong(self.max_token_size));
            }

            let line = buf.split_to(consumed);
            let line = &line[..line_len];

            // Blank keepalive lines carry no message
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            return Self::encode_line(line).map(Some);
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FilterError> {
        if let Some(token) = self.decode(buf)? {
            return Ok(Some(token));
        }
        let rest = buf.split();
        if rest.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        Self::encode_line(&rest).map(Some)
    }
}

/// Encode filter: JSON → IRC wire
#[derive(Debug)]
pub struct JsonToIrc {
    max_token_size: usize,
}

impl JsonToIrc {
    pub fn new(max_token_size: usize) -> Self {
        Self { max_token_size }
    }
}

impl Filter for JsonToIrc {
    fn name(&self) -> &'static str {
        "jsontoirc"
    }

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FilterError> {
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(start) => buf.advance(start),
            None => {
                buf.clear();
                return Ok(None);
            }
        }

        let (next, used) = {
            let mut stream = serde_json::Deserializer::from_slice(&buf[..]).into_iter::<IrcMessage>();
            let next = stream.next();
            (next, stream.byte_offset())
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) if e.is_eof() => {
                if buf.len() >= self.max_token_size {
                    return Err(FilterError::TokenTooLong(self.max_token_size));
                }
                return Ok(None);
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(None),
        };
        buf.advance(used);

        let mut out = msg.marshal()?;
        out.extend_from_slice(LINE_TERMINATOR);
        Ok(Some(Bytes::from(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::irc::IrcError;

    fn decode_all(filter: &mut dyn Filter, input: &[u8]) -> Vec<Bytes> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(token) = filter.decode_eof(&mut buf).unwrap() {
            out.push(token);
        }
        out
    }

    #[test]
    fn test_irc_to_json() {
        let mut filter = IrcToJson::new(1024);
        let mut buf = BytesMut::from(&b":srv PING :abc\r\n\r\nNOTICE * :hi there\n"[..]);

        let first = filter.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first[..], b"{\"prefix\":\"srv\",\"command\":\"PING\",\"params\":[\"abc\"]}\n");

        let second = filter.decode(&mut buf).unwrap().unwrap();
        let msg: IrcMessage = serde_json::from_slice(&second).unwrap();
        assert_eq!(msg.params, vec!["*", "hi there"]);

        assert!(filter.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_irc_to_json_waits_for_line() {
        let mut filter = IrcToJson::new(1024);
        let mut buf = BytesMut::from(&b"PRIVMSG #a :hal"[..]);
        assert!(filter.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"f done\r\n");
        let token = filter.decode(&mut buf).unwrap().unwrap();
        let msg: IrcMessage = serde_json::from_slice(&token).unwrap();
        assert_eq!(msg.params[1], "half done");
    }

    #[test]
    fn test_irc_to_json_final_line_without_terminator() {
        let mut filter = IrcToJson::new(1024);
        let tokens = decode_all(&mut filter, b"PING :a\r\nQUIT");
        assert_eq!(tokens.len(), 2);
        assert!(tokens[1].starts_with(b"{\"command\":\"QUIT\""));
    }

    #[test]
    fn test_irc_to_json_invalid_line() {
        let mut filter = IrcToJson::new(1024);
        let mut buf = BytesMut::from(&b"@a=b\r\n"[..]);
        assert!(matches!(
            filter.decode(&mut buf),
            Err(FilterError::Irc(IrcError::MissingCommand))
        ));
    }

    #[test]
    fn test_json_to_irc() {
        let mut filter = JsonToIrc::new(1024);
        let tokens = decode_all(
            &mut filter,
            br##"{"command":"PRIVMSG","params":["#rust","hello world"]}
               {"command":"PING","params":["x"]}{"command":"QUIT"}  "##,
        );

        assert_eq!(tokens.len(), 3);
        assert_eq!(&tokens[0][..], b"PRIVMSG #rust :hello world\r\n");
        assert_eq!(&tokens[1][..], b"PING x\r\n");
        assert_eq!(&tokens[2][..], b"QUIT\r\n");
    }

    #[test]
    fn test_json_to_irc_partial_document() {
        let mut filter = JsonToIrc::new(1024);
        let mut buf = BytesMut::from(&br#"{"command":"PI"#[..]);
        assert!(filter.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(br#"NG"}"#);
        assert_eq!(&filter.decode(&mut buf).unwrap().unwrap()[..], b"PING\r\n");
    }

    #[test]
    fn test_json_to_irc_truncated_at_eof() {
        let mut filter = JsonToIrc::new(1024);
        let mut buf = BytesMut::from(&br#"{"command":"#[..]);
        assert!(matches!(
            filter.decode_eof(&mut buf),
            Err(FilterError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_json_to_irc_errors() {
        let mut filter = JsonToIrc::new(1024);
        let mut buf = BytesMut::from(&b"not json"[..]);
        assert!(matches!(filter.decode(&mut buf), Err(FilterError::Json(_))));

        let mut filter = JsonToIrc::new(1024);
        let mut buf = BytesMut::from(&br#"{"command":"PRIV MSG"}"#[..]);
        assert!(matches!(
            filter.decode(&mut buf),
            Err(FilterError::Irc(IrcError::InvalidCommand(_)))
        ));
    }

    #[test]
    fn test_json_to_irc_token_too_long() {
        let mut filter = JsonToIrc::new(16);
        let mut buf = BytesMut::from(&br##"{"command":"PRIVMSG","params":["#a""##[..]);
        assert!(matches!(
            filter.decode(&mut buf),
            Err(FilterError::TokenTooLong(16))
        ));
    }

    fn round_trip(line: &[u8]) -> Bytes {
        let mut decoder = IrcToJson::new(1024);
        let json = decode_all(&mut decoder, line);
        assert_eq!(json.len(), 1);

        let mut encoder = JsonToIrc::new(1024);
        let wire = decode_all(&mut encoder, &json[0]);
        assert_eq!(wire.len(), 1);
        wire[0].clone()
    }

    fn payload(line: &[u8]) -> &[u8] {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        line.strip_suffix(b"\r").unwrap_or(line)
    }

    #[test]
    fn test_decode_then_encode_preserves_content() {
        let lines: [&[u8]; 4] = [
            b"@id=1;note=a\\sb :nick!u@h PRIVMSG #rust :hello there\r\n",
            b"PING :irc.example.net\n",
            b":srv 353 me = #chan :alice bob carol\r\n",
            b"JOIN #rust",
        ];

        for line in lines {
            let wire = round_trip(line);
            assert!(wire.ends_with(b"\r\n"));
            assert_eq!(
                IrcMessage::parse_bytes(payload(&wire)).unwrap(),
                IrcMessage::parse_bytes(payload(line)).unwrap()
            );
        }
    }

    #[test]
    fn test_single_word_trailing_param_loses_colon() {
        let wire = round_trip(b"PING :irc.example.net\n");
        assert_eq!(&wire[..], b"PING irc.example.net\r\n");
    }

    #[test]
    fn test_canonical_line_round_trips_exactly() {
        let line = b":srv 353 me = #chan :alice bob carol\r\n";
        assert_eq!(&round_trip(line)[..], &line[..]);
    }
}
