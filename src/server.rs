//! TCP listener and accept loop.
//!
//! Binds the configured address, accepts connections and spawns one task per
//! connection. Only a bind failure is fatal; accept errors and connection
//! errors are logged and never stop the loop.

use crate::commands::DispatchTable;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionOptions, ConnectionStats, Session};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    dispatch: Arc<DispatchTable>,
    options: ConnectionOptions,
    stats: Arc<ConnectionStats>,
    connection_limit: Arc<Semaphore>,
    next_session_id: u64,
}

impl Server {
    /// Binds the configured address.
    pub async fn bind(config: &Config, dispatch: DispatchTable) -> Result<Self, ServerError> {
        let addr = config.bind_address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self::new(
            listener,
            Arc::new(dispatch),
            config.connection_options(),
            config.max_connections,
        ))
    }

    /// Wraps an already bound listener.
    ///
    /// `max_connections` is capped at `Semaphore::MAX_PERMITS`.
    pub fn new(
        listener: TcpListener,
        dispatch: Arc<DispatchTable>,
        options: ConnectionOptions,
        max_connections: usize,
    ) -> Self {
        Server {
            listener,
            dispatch,
            options,
            stats: Arc::new(ConnectionStats::new()),
            connection_limit: Arc::new(Semaphore::new(max_connections.min(Semaphore::MAX_PERMITS))),
            next_session_id: 1,
        }
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared statistics for every connection this server accepts.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Accepts connections forever.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        match self.local_addr() {
            Ok(addr) => info!(address = %addr, commands = ?self.dispatch.names(), "Server listening"),
            Err(e) => error!(error = %e, "Listener has no local address"),
        }

        tokio::select! {
            _ = self.accept_loop() => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }

        info!(
            connections = self.stats.connections_accepted.load(Ordering::Relaxed),
            active = self.stats.active_connections.load(Ordering::Relaxed),
            commands = self.stats.commands_processed.load(Ordering::Relaxed),
            failed = self.stats.commands_failed.load(Ordering::Relaxed),
            protocol_errors = self.stats.protocol_errors.load(Ordering::Relaxed),
            "Server stopped"
        );
    }

    /// Main loop that accepts incoming connections
    async fn accept_loop(&mut self) {
        loop {
            // Wait for a connection slot
            let permit = match Arc::clone(&self.connection_limit).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Connection limiter closed");
                    return;
                }
            };

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let session = Session::new(self.next_session_id, addr);
                    self.next_session_id += 1;
                    debug!(peer = %addr, session = session.id(), "New connection");

                    let dispatch = Arc::clone(&self.dispatch);
                    let options = self.options.clone();
                    let stats = Arc::clone(&self.stats);

                    // Spawn a task to handle this connection
                    tokio::spawn(async move {
                        handle_connection(stream, session, dispatch, options, stats).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    drop(permit);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpStream;

    const READ_TIMEOUT: Duration = Duration::from_secs(2);

    async fn start_server(options: ConnectionOptions, max_connections: usize) -> (SocketAddr, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::new(
            listener,
            Arc::new(DispatchTable::standard()),
            options,
            max_connections,
        );
        let addr = server.local_addr().unwrap();
        let stats = server.stats();

        tokio::spawn(server.run());

        (addr, stats)
    }

    struct Client {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> Self {
            let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
            Self {
                reader: BufReader::new(reader),
                writer,
            }
        }

        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        /// Reads one response line; `None` on EOF.
        async fn recv(&mut self) -> Option<String> {
            let mut line = String::new();
            let n = tokio::time::timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for a response")
                .unwrap();
            (n > 0).then(|| line.trim_end_matches('\n').to_string())
        }

        async fn request(&mut self, line: &str) -> String {
            self.send(line).await;
            self.recv().await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_mult() {
        let (addr, _) = start_server(ConnectionOptions::default(), 10).await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.request("MULT 6 7").await, "42");
    }

    #[tokio::test]
    async fn test_errors_keep_connection_usable() {
        let (addr, _) = start_server(ConnectionOptions::default(), 10).await;
        let mut client = Client::connect(addr).await;

        assert_eq!(
            client.request("MULT 6").await,
            "ERROR wrong number of arguments for 'MULT'"
        );
        assert_eq!(client.request("MULT abc 7").await, "ERROR invalid integer 'abc'");
        assert_eq!(client.request("HELLO").await, "ERROR unknown command");
        assert_eq!(client.request("MULT 6 7").await, "42");
    }

    #[tokio::test]
    async fn test_concurrent_connections_are_independent() {
        let (addr, stats) = start_server(ConnectionOptions::default(), 10).await;

        let tasks: Vec<_> = (1..=2i64)
            .map(|factor| {
                tokio::spawn(async move {
                    let mut client = Client::connect(addr).await;
                    for i in 0..50i64 {
                        let response = client.request(&format!("MULT {} {}", i, factor)).await;
                        assert_eq!(response, (i * factor).to_string());
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 100);
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_quit_closes_connection() {
        let (addr, _) = start_server(ConnectionOptions::default(), 10).await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.request("QUIT").await, "BYE");
        assert_eq!(client.recv().await, None);
    }

    #[tokio::test]
    async fn test_input_after_quit_does_not_reset() {
        let (addr, _) = start_server(ConnectionOptions::default(), 10).await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.request("QUIT").await, "BYE");
        client.send("PING").await;
        assert_eq!(client.recv().await, None);
    }

    #[tokio::test]
    async fn test_oversized_connection_limit_is_capped() {
        let (addr, _) = start_server(ConnectionOptions::default(), usize::MAX).await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.request("MULT 6 7").await, "42");
    }

    #[tokio::test]
    async fn test_greeting_sent_on_connect() {
        let options = ConnectionOptions {
            greeting: Some("Welcome".to_string()),
            ..ConnectionOptions::default()
        };
        let (addr, _) = start_server(options, 10).await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.recv().await.as_deref(), Some("Welcome"));
        assert_eq!(client.request("PING").await, "PONG");
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let options = ConnectionOptions {
            idle_timeout: Some(Duration::from_millis(200)),
            ..ConnectionOptions::default()
        };
        let (addr, stats) = start_server(options, 10).await;
        let mut client = Client::connect(addr).await;

        assert_eq!(client.recv().await, None);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let (addr, _) = start_server(ConnectionOptions::default(), 1).await;

        let mut first = Client::connect(addr).await;
        assert_eq!(first.request("PING").await, "PONG");

        // The second client is queued behind the only permit
        let mut second = Client::connect(addr).await;
        second.send("PING").await;
        let mut line = String::new();
        let waiting =
            tokio::time::timeout(Duration::from_millis(200), second.reader.read_line(&mut line)).await;
        assert!(waiting.is_err());

        drop(first);
        assert_eq!(second.recv().await.as_deref(), Some("PONG"));
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = Config {
            port: taken.local_addr().unwrap().port(),
            ..Config::default()
        };

        let result = Server::bind(&config, DispatchTable::standard()).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::new(
            listener,
            Arc::new(DispatchTable::standard()),
            ConnectionOptions::default(),
            10,
        );
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        tokio::time::timeout(READ_TIMEOUT, handle)
            .await
            .unwrap()
            .unwrap();
    }
}
