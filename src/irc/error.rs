//! IRC codec error types

/// Error type for IRC parse and marshal operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcError {
    /// Line contained nothing but whitespace
    Empty,
    /// Line had tags or a prefix but no command
    MissingCommand,
    /// Command is empty or contains non-alphanumeric characters
    InvalidCommand(String),
    /// Prefix is empty or contains a space
    InvalidPrefix(String),
    /// Tag key is empty or contains a reserved character
    InvalidTag(String),
    /// Parameter cannot be represented on the wire
    InvalidParam(String),
    /// Line is not valid UTF-8
    InvalidUtf8,
}

impl std::fmt::Display for IrcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrcError::Empty => write!(f, "empty IRC message"),
            IrcError::MissingCommand => write!(f, "IRC message has no command"),
            IrcError::InvalidCommand(cmd) => write!(f, "invalid IRC command: {:?}", cmd),
            IrcError::InvalidPrefix(prefix) => write!(f, "invalid IRC prefix: {:?}", prefix),
            IrcError::InvalidTag(tag) => write!(f, "invalid IRC tag: {:?}", tag),
            IrcError::InvalidParam(param) => write!(f, "invalid IRC parameter: {:?}", param),
            IrcError::InvalidUtf8 => write!(f, "IRC message is not valid UTF-8"),
        }
    }
}

impl std::error::Error for IrcError {}
