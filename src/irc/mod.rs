//! IRC wire codec
//!
//! The transcoding filters need three things from a protocol codec: a way to
//! find the end of one unit in a byte buffer, a parser from wire form to a
//! structured value, and a marshaller back to wire form. For IRC these are
//! [`split_line`], [`IrcMessage::parse`] and [`IrcMessage::marshal`].
//!
//! ```text
//! @time=12:00;id=7 :nick!user@host PRIVMSG #rust :hello world\r\n
//! └──── tags ────┘ └─── prefix ──┘ └command┘ └────params─────┘
//! ```
//!
//! The structured form is JSON via serde:
//!
//! ```json
//! {"tags":{"id":"7","time":"12:00"},"prefix":"nick!user@host",
//!  "command":"PRIVMSG","params":["#rust","hello world"]}
//! ```

pub mod error;
pub mod message;

pub use error::IrcError;
pub use message::{split_line, IrcMessage, LINE_TERMINATOR};
