//! dispatchd - A Line-Oriented Command Dispatch Server
//!
//! This is the main entry point for the dispatchd server.
//! It loads the configuration, installs logging and runs the listener
//! until Ctrl+C.

use dispatchd::{Config, DispatchTable, Server};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
dispatchd v{} - Line-Oriented Command Dispatch Server
──────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Try it:  printf 'MULT 6 7\n' | nc {} {}
Use Ctrl+C to shutdown gracefully.
"#,
        dispatchd::VERSION,
        config.bind_address(),
        config.host,
        config.port
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments and the optional config file
    let config = Config::load()?;

    // Set up logging; RUST_LOG wins over the configured level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        address = %config.bind_address(),
        max_connections = config.max_connections,
        max_line_length = config.max_line_length,
        idle_timeout_secs = config.idle_timeout_secs,
        "Starting dispatchd"
    );

    // The dispatch table is built once and shared by every connection
    let dispatch = DispatchTable::standard();

    // Bind the TCP listener
    let server = Server::bind(&config, dispatch).await?;

    // Print the banner
    print_banner(&config);

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    server.run_until(shutdown).await;

    info!("Server shutdown complete");
    Ok(())
}
