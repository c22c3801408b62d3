//! IRC message parsing and serialization

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::IrcError;

/// Canonical IRC line terminator, appended by the encoder regardless of how
/// the source delimited its lines
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// A single IRC protocol message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IrcMessage {
    /// IRCv3 message tags (unescaped values)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    /// Source of the message (`nick!user@host` or a server name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Command name or three-digit numeric
    pub command: String,

    /// Parameters; the final one may contain spaces
    #[serde(default)]
    pub params: Vec<String>,
}

/// Locate one IRC line at the start of `buf`
///
/// Returns `(line_len, consumed)`: the length of the line without its
/// terminator, and the number of bytes to discard including the terminator.
/// Accepts both `\r\n` and bare `\n`. Returns `None` when no complete line is
/// buffered yet.
pub fn split_line(buf: &[u8]) -> Option<(usize, usize)> {
    let newline = buf.iter().position(|&b| b == b'\n')?;
    let line_len = if newline > 0 && buf[newline - 1] == b'\r' {
        newline - 1
    } else {
        newline
    };
    Some((line_len, newline + 1))
}

impl IrcMessage {
    /// Create a message with a command and parameters
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            tags: BTreeMap::new(),
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Set the prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Parse raw bytes of one line (terminator optional)
    pub fn parse_bytes(line: &[u8]) -> Result<Self, IrcError> {
        let line = std::str::from_utf8(line).map_err(|_| IrcError::InvalidUtf8)?;
        Self::parse(line)
    }

    /// Parse one line (terminator optional)
    pub fn parse(line: &str) -> Result<Self, IrcError> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start_matches(' ');
        if rest.trim().is_empty() {
            return Err(IrcError::Empty);
        }

        let mut msg = IrcMessage::default();

        if let Some(tagged) = rest.strip_prefix('@') {
            let (tags, after) = tagged.split_once(' ').ok_or(IrcError::MissingCommand)?;
            msg.tags = parse_tags(tags)?;
            rest = after.trim_start_matches(' ');
        }

        if let Some(prefixed) = rest.strip_prefix(':') {
            let (prefix, after) = prefixed.split_once(' ').ok_or(IrcError::MissingCommand)?;
            if prefix.is_empty() {
                return Err(IrcError::InvalidPrefix(prefix.to_string()));
            }
            msg.prefix = Some(prefix.to_string());
            rest = after.trim_start_matches(' ');
        }

        let (command, mut params) = match rest.split_once(' ') {
            Some((command, params)) => (command, params),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(IrcError::MissingCommand);
        }
        validate_command(command)?;
        msg.command = command.to_string();

        loop {
            params = params.trim_start_matches(' ');
            if params.is_empty() {
                break;
            }
            if let Some(trailing) = params.strip_prefix(':') {
                msg.params.push(trailing.to_string());
                break;
            }
            match params.split_once(' ') {
                Some((middle, after)) => {
                    msg.params.push(middle.to_string());
                    params = after;
                }
                None => {
                    msg.params.push(params.to_string());
                    break;
                }
            }
        }

        Ok(msg)
    }

    /// Serialize to wire form, without a line terminator
    pub fn marshal(&self) -> Result<Vec<u8>, IrcError> {
        validate_command(&self.command)?;

        let mut out = String::with_capacity(64);

        if !self.tags.is_empty() {
            out.push('@');
            for (i, (key, value)) in self.tags.iter().enumerate() {
                if key.is_empty() || key.contains([' ', ';', '=', '\r', '\n', '\0']) {
                    return Err(IrcError::InvalidTag(key.clone()));
                }
                if i > 0 {
                    out.push(';');
                }
                out.push_str(key);
                if !value.is_empty() {
                    out.push('=');
                    escape_tag_value(value, &mut out);
                }
            }
            out.push(' ');
        }

        if let Some(ref prefix) = self.prefix {
            if prefix.is_empty() || prefix.contains([' ', '\r', '\n', '\0']) {
                return Err(IrcError::InvalidPrefix(prefix.clone()));
            }
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }

        out.push_str(&self.command);

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if param.contains(['\r', '\n', '\0']) {
                return Err(IrcError::InvalidParam(param.clone()));
            }
            let needs_trailing = param.is_empty() || param.contains(' ') || param.starts_with(':');
            if needs_trailing && i != last {
                return Err(IrcError::InvalidParam(param.clone()));
            }
            out.push(' ');
            if needs_trailing {
                out.push(':');
            }
            out.push_str(param);
        }

        Ok(out.into_bytes())
    }
}

fn validate_command(command: &str) -> Result<(), IrcError> {
    if command.is_empty() || !command.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(IrcError::InvalidCommand(command.to_string()));
    }
    Ok(())
}

fn parse_tags(raw: &str) -> Result<BTreeMap<String, String>, IrcError> {
    let mut tags = BTreeMap::new();
    for item in raw.split(';').filter(|item| !item.is_empty()) {
        let (key, value) = item.split_once('=').unwrap_or((item, ""));
        if key.is_empty() {
            return Err(IrcError::InvalidTag(item.to_string()));
        }
        tags.insert(key.to_string(), unescape_tag_value(value));
    }
    Ok(tags)
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        // A lone trailing backslash is dropped
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape_tag_value(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
}
