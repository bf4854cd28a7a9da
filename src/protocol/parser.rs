//! Incremental Line Parser
//!
//! This module frames the inbound byte stream into newline-terminated lines
//! and turns each line into a [`Command`].
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((frame, consumed)))` - A complete line was framed, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the line is incomplete
//! - `Err(ParseError)` - The line at the front of the buffer is unusable
//!
//! After an error the parser enters a discarding state: the following calls
//! drop bytes up to and including the next `\n` and report them as
//! [`Frame::Empty`]. This lets the caller report the error to the client and
//! keep the connection open without ever buffering an unbounded line.

use crate::protocol::types::{Command, Frame, LF};
use thiserror::Error;

/// Errors that can occur while framing a line.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The line exceeds the configured maximum length
    #[error("line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },

    /// The line is not valid UTF-8
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),
}

impl ParseError {
    /// The stable message reported to the client for this error.
    pub fn client_message(&self) -> &'static str {
        match self {
            ParseError::LineTooLong { .. } => "line too long",
            ParseError::InvalidUtf8(_) => "invalid utf-8",
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Default maximum request line length in bytes, terminator excluded
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// An incremental, newline-delimited command parser.
///
/// # Example
///
/// ```ignore
/// use dispatchd::protocol::parser::LineParser;
/// use bytes::{Buf, BytesMut};
///
/// let mut parser = LineParser::new(1024);
/// let mut buffer = BytesMut::from(&b"MULT 6 7\n"[..]);
///
/// if let Some((frame, consumed)) = parser.parse(&buffer)? {
///     buffer.advance(consumed);
///     println!("Parsed: {:?}", frame);
/// }
/// ```
#[derive(Debug)]
pub struct LineParser {
    /// Longest accepted line, not counting `\r\n`
    max_line_length: usize,
    /// Dropping input through the next `\n` after an error
    discarding: bool,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineParser {
    /// Creates a new parser that rejects lines longer than `max_line_length`.
    pub fn new(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            discarding: false,
        }
    }

    /// Returns the configured maximum line length.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Returns true while the parser is dropping the rest of a rejected line.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Attempts to frame one line from the front of the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((frame, consumed)))` - A line was framed (or discarded)
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - The current line was rejected
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        let newline = find_lf(buf);

        if self.discarding {
            let consumed = match newline {
                Some(pos) => {
                    self.discarding = false;
                    pos + 1
                }
                None => buf.len(),
            };
            return Ok(Some((Frame::Empty, consumed)));
        }

        let pos = match newline {
            Some(pos) => pos,
            None => {
                // One extra byte of slack for a `\r` still waiting on its `\n`
                if buf.len() > self.max_line_length.saturating_add(1) {
                    self.discarding = true;
                    return Err(ParseError::LineTooLong {
                        size: buf.len(),
                        max: self.max_line_length,
                    });
                }
                return Ok(None);
            }
        };

        let raw = &buf[..pos];
        let content = raw.strip_suffix(b"\r").unwrap_or(raw);
        if content.len() > self.max_line_length {
            self.discarding = true;
            return Err(ParseError::LineTooLong {
                size: content.len(),
                max: self.max_line_length,
            });
        }

        let line = match std::str::from_utf8(content) {
            Ok(line) => line,
            Err(e) => {
                self.discarding = true;
                return Err(ParseError::InvalidUtf8(e.to_string()));
            }
        };

        let frame = match Command::from_line(line) {
            Some(command) => Frame::Command(command),
            None => Frame::Empty,
        };

        Ok(Some((frame, pos + 1)))
    }
}

/// Finds the position of the first `\n` in the buffer.
#[inline]
fn find_lf(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == LF)
}

/// Helper function to parse a single line with the default limits.
///
/// This is a convenience function for simple use cases.
pub fn parse_line(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    LineParser::default().parse(buf)
}
