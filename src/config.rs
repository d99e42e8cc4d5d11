//! Configuration handling for the gateway.
//!
//! This module provides configuration management via CLI arguments and
//! environment variables. [`Config`] is parsed once in `main`; the request
//! path only ever sees the derived [`GatewaySettings`].

use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};
use crate::models::{Backend, ConnectionTarget, PostgresSettings};
use crate::tools::guard::GuardMode;

pub const DEFAULT_PG_HOST: &str = "localhost";
pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_PG_USER: &str = "postgres";
pub const DEFAULT_PG_PASSWORD: &str = "postgres";
pub const DEFAULT_PG_DATABASE: &str = "housing";
pub const DEFAULT_PG_SCHEMA: &str = "public";

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8050;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 60;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolOptions {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }
        if self.min_connections > self.max_connections {
            return Err(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            ));
        }
        if self.acquire_timeout_secs == 0 {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Configuration for the gateway.
#[derive(Clone, Parser)]
#[command(
    name = "postgres-mcp-server",
    about = "Read-only MCP gateway for PostgreSQL - lets AI assistants run SELECT queries and inspect schema",
    version,
    author
)]
pub struct Config {
    /// PostgreSQL host
    #[arg(long, default_value = DEFAULT_PG_HOST, env = "POSTGRES_HOST")]
    pub pg_host: String,

    /// PostgreSQL port
    #[arg(long, default_value_t = DEFAULT_PG_PORT, env = "POSTGRES_PORT")]
    pub pg_port: u16,

    /// PostgreSQL user
    #[arg(long, default_value = DEFAULT_PG_USER, env = "POSTGRES_USER")]
    pub pg_user: String,

    /// PostgreSQL password
    #[arg(
        long,
        default_value = DEFAULT_PG_PASSWORD,
        env = "POSTGRES_PASSWORD",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub pg_password: String,

    /// PostgreSQL database name
    #[arg(long, default_value = DEFAULT_PG_DATABASE, env = "POSTGRES_DB")]
    pub pg_database: String,

    /// Schema exposed by list_tables, get_table_schema and the schema resource
    #[arg(long, default_value = DEFAULT_PG_SCHEMA, env = "POSTGRES_SCHEMA")]
    pub pg_schema: String,

    /// Full connection URL (postgres:// or sqlite:). Overrides the --pg-* connection settings.
    #[arg(long, value_name = "URL", env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Statement and catalog timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "MCP_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Maximum pooled connections
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS, env = "MCP_MAX_CONNECTIONS")]
    pub max_connections: u32,

    /// Minimum idle connections kept open
    #[arg(long, default_value_t = DEFAULT_MIN_CONNECTIONS, env = "MCP_MIN_CONNECTIONS")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    #[arg(
        long,
        default_value_t = DEFAULT_ACQUIRE_TIMEOUT_SECS,
        env = "MCP_ACQUIRE_TIMEOUT"
    )]
    pub acquire_timeout: u64,

    /// Seconds before an idle connection is closed
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_SECS, env = "MCP_IDLE_TIMEOUT")]
    pub idle_timeout: u64,

    /// Cap on rows returned per query (unlimited when unset)
    #[arg(long, env = "MCP_MAX_ROWS")]
    pub max_rows: Option<u32>,

    /// Statement guard mode
    #[arg(long, value_enum, default_value = "conservative", env = "MCP_GUARD_MODE")]
    pub guard_mode: GuardMode,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("pg_host", &self.pg_host)
            .field("pg_port", &self.pg_port)
            .field("pg_user", &self.pg_user)
            .field("pg_password", &"***")
            .field("pg_database", &self.pg_database)
            .field("pg_schema", &self.pg_schema)
            .field(
                "database_url",
                &self
                    .database_url
                    .as_deref()
                    .map(crate::error::sanitize_message),
            )
            .field("transport", &self.transport)
            .field("http_host", &self.http_host)
            .field("http_port", &self.http_port)
            .field("mcp_endpoint", &self.mcp_endpoint)
            .field("query_timeout", &self.query_timeout)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_rows", &self.max_rows)
            .field("guard_mode", &self.guard_mode)
            .field("log_level", &self.log_level)
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            pg_host: DEFAULT_PG_HOST.to_string(),
            pg_port: DEFAULT_PG_PORT,
            pg_user: DEFAULT_PG_USER.to_string(),
            pg_password: DEFAULT_PG_PASSWORD.to_string(),
            pg_database: DEFAULT_PG_DATABASE.to_string(),
            pg_schema: DEFAULT_PG_SCHEMA.to_string(),
            database_url: None,
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT_SECS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT_SECS,
            max_rows: None,
            guard_mode: GuardMode::Conservative,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Check every setting; any failure is fatal at startup.
    pub fn validate(&self) -> GatewayResult<()> {
        let required = [
            ("pg-host", &self.pg_host),
            ("pg-user", &self.pg_user),
            ("pg-database", &self.pg_database),
            ("pg-schema", &self.pg_schema),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(GatewayError::configuration(format!(
                    "--{} must not be empty",
                    name
                )));
            }
        }
        if self.pg_port == 0 {
            return Err(GatewayError::configuration("--pg-port must be greater than 0"));
        }
        if self.query_timeout == 0 {
            return Err(GatewayError::configuration(
                "--query-timeout must be greater than 0",
            ));
        }
        if self.max_rows == Some(0) {
            return Err(GatewayError::configuration(
                "--max-rows must be greater than 0 when set",
            ));
        }
        if !self.mcp_endpoint.starts_with('/') {
            return Err(GatewayError::configuration(
                "--mcp-endpoint must start with '/'",
            ));
        }
        self.pool_options()
            .validate()
            .map_err(GatewayError::configuration)?;
        self.connection_target()?;
        Ok(())
    }

    /// Where to connect: `--database-url` when set, else the discrete settings.
    pub fn connection_target(&self) -> GatewayResult<ConnectionTarget> {
        match self.database_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => ConnectionTarget::from_url(url).ok_or_else(|| {
                GatewayError::configuration(format!(
                    "Unsupported database URL '{}': expected postgres:// or sqlite:",
                    crate::error::sanitize_message(url)
                ))
            }),
            _ => Ok(ConnectionTarget::Postgres(PostgresSettings {
                host: self.pg_host.clone(),
                port: self.pg_port,
                user: self.pg_user.clone(),
                password: self.pg_password.clone(),
                database: self.pg_database.clone(),
            })),
        }
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            idle_timeout_secs: self.idle_timeout,
            acquire_timeout_secs: self.acquire_timeout,
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Request-path settings derived once from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Schema the catalog reads (PostgreSQL only)
    pub schema_name: String,
    pub query_timeout: Duration,
    pub acquire_timeout: Duration,
    pub max_rows: Option<u32>,
    pub guard_mode: GuardMode,
}

impl GatewaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            schema_name: config.pg_schema.clone(),
            query_timeout: config.query_timeout_duration(),
            acquire_timeout: config.pool_options().acquire_timeout(),
            max_rows: config.max_rows,
            guard_mode: config.guard_mode,
        }
    }

    /// Schema label used in snapshots.
    pub fn schema_label(&self, backend: Backend) -> &str {
        match backend {
            Backend::PostgreSQL => &self.schema_name,
            Backend::SQLite => "main",
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
