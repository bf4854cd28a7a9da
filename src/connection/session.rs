//! Per-connection session context.
//!
//! A [`Session`] is what command handlers see of a connection. Responses are
//! appended to an ordered write queue; the connection task drains the queue
//! onto the socket after each batch of commands, so `send_response` never
//! blocks and never touches the network itself.

use crate::protocol::Reply;
use bytes::Bytes;
use std::collections::VecDeque;
use std::net::SocketAddr;

/// Context handed to command handlers for one connected client.
#[derive(Debug)]
pub struct Session {
    /// Server-assigned identifier, unique for the process lifetime
    id: u64,
    /// Client's address
    peer_addr: SocketAddr,
    /// Framed responses waiting to be written, oldest first
    write_queue: VecDeque<Bytes>,
    /// Set once the session asked for the connection to end
    closing: bool,
}

impl Session {
    /// Creates a session for a freshly accepted connection.
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            write_queue: VecDeque::new(),
            closing: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Queues `text` as one response line.
    ///
    /// The newline terminator is appended here. Returns once the line is
    /// enqueued; delivery happens when the connection flushes.
    pub fn send_response(&mut self, text: impl Into<String>) {
        self.send_reply(&Reply::line(text));
    }

    /// Queues an `ERROR <message>` line.
    pub fn send_error(&mut self, message: impl Into<String>) {
        self.send_reply(&Reply::error(message));
    }

    /// Queues an already-built reply.
    pub fn send_reply(&mut self, reply: &Reply) {
        self.write_queue.push_back(reply.serialize());
    }

    /// Asks the connection to close once pending responses are flushed.
    pub fn close(&mut self) {
        self.closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Number of responses waiting to be written.
    pub fn pending(&self) -> usize {
        self.write_queue.len()
    }

    /// Removes and returns the oldest queued response.
    pub fn pop_pending(&mut self) -> Option<Bytes> {
        self.write_queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(7, "127.0.0.1:5000".parse().unwrap())
    }

    fn drain(session: &mut Session) -> Vec<Bytes> {
        std::iter::from_fn(|| session.pop_pending()).collect()
    }

    #[test]
    fn test_send_response_appends_newline() {
        let mut session = session();
        session.send_response("42");

        assert_eq!(session.pending(), 1);
        assert_eq!(drain(&mut session), vec![Bytes::from("42\n")]);
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn test_responses_keep_order() {
        let mut session = session();
        session.send_response("1");
        session.send_error("unknown command");
        session.send_response("3");

        assert_eq!(
            drain(&mut session),
            vec![
                Bytes::from("1\n"),
                Bytes::from("ERROR unknown command\n"),
                Bytes::from("3\n"),
            ]
        );
    }

    #[test]
    fn test_close_keeps_queue() {
        let mut session = session();
        assert!(!session.is_closing());

        session.send_response("BYE");
        session.close();

        assert!(session.is_closing());
        assert_eq!(session.pending(), 1);
    }

    #[test]
    fn test_identity() {
        let session = session();
        assert_eq!(session.id(), 7);
        assert_eq!(session.peer_addr().port(), 5000);
    }
}
