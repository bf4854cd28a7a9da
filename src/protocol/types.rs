//! Line Protocol Data Types
//!
//! This module defines the values exchanged over the wire.
//!
//! ## Protocol Format
//!
//! Requests and responses are UTF-8 text lines terminated by `\n`:
//!
//! ```text
//! Request:  MULT 6 7\n
//! Response: 42\n
//!
//! Request:  FROB 1\n
//! Response: ERROR unknown command\n
//! ```
//!
//! A `\r` before the `\n` is tolerated on input, so CRLF clients such as
//! telnet work unchanged. Responses always use a bare `\n`.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The line terminator used for responses
pub const LF: u8 = b'\n';

/// Prefix of every error response line
pub const ERROR_PREFIX: &str = "ERROR";

/// A parsed request line.
///
/// The first whitespace-separated token is the command name, the rest are its
/// arguments. Commands are built per received line and dropped after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name exactly as the client sent it
    pub name: String,
    /// Argument tokens in the order they appeared
    pub args: Vec<String>,
}

impl Command {
    /// Creates a command from a name and its arguments.
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Parses a single line (without its terminator) into a command.
    ///
    /// Returns `None` for a line that is empty after trimming.
    ///
    /// # Example
    /// ```
    /// use dispatchd::protocol::types::Command;
    /// let cmd = Command::from_line("MULT 6 7").unwrap();
    /// assert_eq!(cmd.name, "MULT");
    /// assert_eq!(cmd.args, vec!["6", "7"]);
    /// ```
    pub fn from_line(line: &str) -> Option<Self> {
        let mut tokens = line.split_ascii_whitespace();
        let name = tokens.next()?;
        Some(Self::new(name, tokens.map(str::to_string).collect()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// One newline-delimited unit taken off the inbound byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A line carrying a command
    Command(Command),
    /// A blank line, or bytes dropped while recovering from a framing error
    Empty,
}

/// A response line queued for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain text result, e.g. `42`
    Line(String),
    /// Error report, serialized as `ERROR <message>`
    Error(String),
}

impl Reply {
    /// Creates a plain text reply.
    pub fn line(s: impl Into<String>) -> Self {
        Reply::Line(s.into())
    }

    /// Creates an error reply.
    ///
    /// # Example
    /// ```
    /// use dispatchd::protocol::types::Reply;
    /// let err = Reply::error("unknown command");
    /// assert_eq!(&err.serialize()[..], b"ERROR unknown command\n");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// Serializes the reply to its wire form, terminator included.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Line(s) => {
                buf.reserve(s.len() + 1);
                buf.put_slice(s.as_bytes());
            }
            Reply::Error(s) => {
                buf.reserve(ERROR_PREFIX.len() + s.len() + 2);
                buf.put_slice(ERROR_PREFIX.as_bytes());
                buf.put_u8(b' ');
                buf.put_slice(s.as_bytes());
            }
        }
        buf.put_u8(LF);
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Line(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "{} {}", ERROR_PREFIX, s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_from_line() {
        let cmd = Command::from_line("MULT 6 7").unwrap();
        assert_eq!(cmd, Command::new("MULT", vec!["6".into(), "7".into()]));
    }

    #[test]
    fn test_command_from_line_collapses_whitespace() {
        let cmd = Command::from_line("  ADD\t1    2 ").unwrap();
        assert_eq!(cmd.name, "ADD");
        assert_eq!(cmd.args, vec!["1", "2"]);
    }

    #[test]
    fn test_command_without_args() {
        let cmd = Command::from_line("PING").unwrap();
        assert_eq!(cmd.name, "PING");
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_blank_line_is_not_a_command() {
        assert_eq!(Command::from_line(""), None);
        assert_eq!(Command::from_line(" \t\r"), None);
    }

    #[test]
    fn test_command_display() {
        let cmd = Command::from_line("MULT 6 7").unwrap();
        assert_eq!(cmd.to_string(), "MULT 6 7");
    }

    #[test]
    fn test_line_serialize() {
        assert_eq!(&Reply::line("42").serialize()[..], b"42\n");
        assert_eq!(&Reply::line("").serialize()[..], b"\n");
    }

    #[test]
    fn test_error_serialize() {
        let reply = Reply::error("unknown command");
        assert!(matches!(reply, Reply::Error(_)));
        assert_eq!(&reply.serialize()[..], b"ERROR unknown command\n");
        assert_eq!(reply.to_string(), "ERROR unknown command");
    }
}
