//! # dispatchd - A Line-Oriented Command Dispatch Server
//!
//! dispatchd accepts TCP clients, reads newline-terminated text commands,
//! dispatches each one to a named handler and writes one response line back.
//! It demonstrates systems programming concepts like per-connection tasks,
//! incremental framing, and immutable shared dispatch state.
//!
//! ## Features
//!
//! - **Simple Wire Protocol**: `NAME arg1 arg2 ...\n` in, one line out
//! - **Static Dispatch Table**: Built once at startup, shared without locks
//! - **Isolated Failures**: Bad input is answered with `ERROR ...`, never a crash
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              dispatchd                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Dispatch   │                  │
//! │  │ (Listener)  │    │  Handler    │    │   Table     │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌─────────────┐                  │
//! │                     │    Line     │    │   Session   │                  │
//! │                     │   Parser    │    │ write queue │                  │
//! │                     └─────────────┘    └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use dispatchd::{Config, DispatchTable, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let server = Server::bind(&config, DispatchTable::standard()).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `MULT a b [n ...]` - Product of 32-bit integers
//! - `ADD n [n ...]` - Sum
//! - `SUB a b [n ...]` - Left-to-right difference
//! - `DIV a b [n ...]` - Left-to-right truncating quotient
//! - `PING [message]` - `PONG` or `PONG message`
//! - `ECHO message` - The message back
//! - `QUIT` - `BYE`, then the server closes the connection
//!
//! ## Error Responses
//!
//! Every error is a single line starting with `ERROR `:
//!
//! - `ERROR unknown command`
//! - `ERROR wrong number of arguments for 'NAME'`
//! - `ERROR invalid integer 'TOKEN'`
//! - `ERROR integer overflow`
//! - `ERROR division by zero`
//! - `ERROR line too long`
//! - `ERROR invalid utf-8`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Line framing, commands and reply serialization
//! - [`commands`]: Dispatch table and the builtin handlers
//! - [`connection`]: Client connection management and sessions
//! - [`server`]: Listener and accept loop
//! - [`config`]: CLI and TOML configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use commands::{CommandError, DispatchTable, Handler};
pub use config::{Config, ConfigError};
pub use connection::{handle_connection, ConnectionOptions, ConnectionStats, Session};
pub use protocol::{Command, LineParser, ParseError, Reply};
pub use server::{Server, ServerError};

/// The default port dispatchd listens on
pub const DEFAULT_PORT: u16 = 4040;

/// The default host dispatchd binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of dispatchd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
