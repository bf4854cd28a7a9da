//! Command Handler Module
//!
//! This module implements the command processing layer for dispatchd.
//! It receives parsed commands, looks them up in the dispatch table,
//! runs the matching handler and reports failures to the client.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ DispatchTable   │  (this module)
//! │                 │
//! │  - Lookup       │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Session      │  (connection module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Arithmetic Commands
//! - `MULT a b [n ...]`, `ADD n [n ...]`
//! - `SUB a b [n ...]`, `DIV a b [n ...]`
//!
//! ### Control Commands
//! - `PING [message]`, `ECHO message`, `QUIT`

pub mod arithmetic;
pub mod control;
pub mod dispatch;

use crate::connection::Session;
use thiserror::Error;

// Re-export the dispatch table
pub use dispatch::{DispatchTable, DispatchTableBuilder, UNKNOWN_COMMAND};

/// Validation failures raised by a handler.
///
/// These never end the connection: the dispatch table turns them into an
/// `ERROR <message>` response on the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Too few (or too many) arguments for the command
    #[error("wrong number of arguments for '{0}'")]
    WrongArity(&'static str),

    /// An argument that should be a 32-bit integer is not
    #[error("invalid integer '{0}'")]
    InvalidInteger(String),

    /// The result does not fit in a 64-bit integer
    #[error("integer overflow")]
    Overflow,

    /// Division with a zero divisor
    #[error("division by zero")]
    DivisionByZero,
}

/// Logic executed for one named command.
///
/// Handlers write their output through the session and report validation
/// failures as [`CommandError`]. Plain functions with the matching signature
/// implement this trait.
pub trait Handler: Send + Sync {
    fn execute(&self, session: &mut Session, args: &[String]) -> Result<(), CommandError>;
}

impl<F> Handler for F
where
    F: Fn(&mut Session, &[String]) -> Result<(), CommandError> + Send + Sync,
{
    fn execute(&self, session: &mut Session, args: &[String]) -> Result<(), CommandError> {
        self(session, args)
    }
}
