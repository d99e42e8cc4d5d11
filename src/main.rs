//! PostgreSQL MCP Server - Main entry point.
//!
//! Read-only MCP gateway: AI assistants run guarded SELECT statements and
//! inspect the schema of one PostgreSQL (or SQLite) database.

use clap::Parser;
use postgres_mcp_server::config::{Config, GatewaySettings, TransportMode};
use postgres_mcp_server::db::DbPool;
use postgres_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs always go to stderr; stdout belongs to the stdio transport.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    init_tracing(&config);

    // Configuration errors are fatal: the server never starts serving
    let target = match config.validate().and_then(|()| config.connection_target()) {
        Ok(target) => target,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        transport = %config.transport,
        guard_mode = %config.guard_mode,
        "Starting PostgreSQL MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = match DbPool::connect(&target, &config.pool_options()).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, suggestion = ?e.suggestion(), "Failed to connect");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let version = pool.server_version().await;
    info!(
        connection = %target.redacted(),
        backend = %pool.backend(),
        version = version.as_deref().unwrap_or("unknown"),
        "Database ready"
    );

    let settings = Arc::new(GatewaySettings::from_config(&config));

    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            let transport = StdioTransport::new(pool, settings);
            transport.run().await
        }
        TransportMode::Http => {
            info!(
                addr = %config.http_bind_addr(),
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            let transport = HttpTransport::new(
                pool,
                settings,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            );
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
