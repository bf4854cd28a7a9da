//! Dispatch Table Module
//!
//! This module maps command names to handlers. The table is assembled once
//! at startup through [`DispatchTableBuilder`] and is immutable afterwards,
//! so every connection task can share it behind an `Arc` without locking.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DispatchTable                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  lookup()   │───>│  execute()  │───>│  report()   │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                            Session          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookup is ASCII case-insensitive: names are stored upper-case and the
//! incoming name is upper-cased before the lookup.

use super::{arithmetic, control, Handler};
use crate::connection::Session;
use crate::protocol::Command;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Message sent when no handler is registered under the requested name
pub const UNKNOWN_COMMAND: &str = "unknown command";

/// Immutable mapping from command name to handler.
pub struct DispatchTable {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl DispatchTable {
    /// Starts building a table.
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::default()
    }

    /// The table with every builtin command registered.
    pub fn standard() -> Self {
        Self::builder()
            .register("MULT", arithmetic::mult)
            .register("ADD", arithmetic::add)
            .register("SUB", arithmetic::sub)
            .register("DIV", arithmetic::div)
            .register("PING", control::ping)
            .register("ECHO", control::echo)
            .register("QUIT", control::quit)
            .build()
    }

    /// Executes a command against the session.
    ///
    /// Every outcome is reported through the session: handler output on
    /// success, `ERROR <message>` on a handler failure and
    /// `ERROR unknown command` when nothing is registered under the name.
    /// Returns true when a handler ran successfully.
    pub fn execute(&self, session: &mut Session, command: &Command) -> bool {
        let name = command.name.to_ascii_uppercase();

        let Some(handler) = self.handlers.get(&name) else {
            debug!(session = session.id(), command = %name, "Unknown command");
            session.send_error(UNKNOWN_COMMAND);
            return false;
        };

        match handler.execute(session, &command.args) {
            Ok(()) => true,
            Err(e) => {
                debug!(session = session.id(), command = %name, error = %e, "Command failed");
                session.send_error(e.to_string());
                false
            }
        }
    }

    /// Returns true if a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_ascii_uppercase())
    }

    /// Registered command names in alphabetical order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("commands", &self.names())
            .finish()
    }
}

/// Collects handlers before the table is frozen.
#[derive(Default)]
pub struct DispatchTableBuilder {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl DispatchTableBuilder {
    /// Registers `handler` under `name`.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register<H>(mut self, name: &str, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.handlers
            .insert(name.to_ascii_uppercase(), Box::new(handler));
        self
    }

    /// Freezes the registered handlers into an immutable table.
    pub fn build(self) -> DispatchTable {
        DispatchTable {
            handlers: self.handlers,
        }
    }
}
