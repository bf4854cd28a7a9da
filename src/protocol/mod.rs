//! Line Protocol Implementation
//!
//! This module implements the newline-delimited text protocol spoken by
//! dispatchd.
//!
//! ## Overview
//!
//! Every request is one UTF-8 line: a command name followed by
//! whitespace-separated arguments. Every request produces at most one
//! response line; blank lines produce none.
//!
//! ## Modules
//!
//! - `types`: Defines `Command`, `Frame` and the `Reply` serialization
//! - `parser`: Incremental line framer with length and UTF-8 checks
//!
//! ## Example
//!
//! ```ignore
//! use dispatchd::protocol::{parse_line, Frame, Reply};
//!
//! // Parsing incoming data
//! let (frame, consumed) = parse_line(b"MULT 6 7\n").unwrap().unwrap();
//!
//! // Creating responses
//! let bytes = Reply::line("42").serialize();
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_line, LineParser, ParseError, ParseResult, DEFAULT_MAX_LINE_LENGTH};
pub use types::{Command, Frame, Reply};
