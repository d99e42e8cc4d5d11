//! Connection pool management.
//!
//! One pool is opened at startup and shared by every request. Sessions are
//! opened read-only: PostgreSQL connections set
//! `default_transaction_read_only`, SQLite files are opened read-only.

use crate::config::PoolOptions;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{Backend, ConnectionTarget, PlaceholderStyle};
use sqlx::{
    PgPool, SqlitePool,
    postgres::{PgConnectOptions, PgPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const APPLICATION_NAME: &str = "postgres-mcp-server";

/// Backend-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Open the pool for `target`. Fails when the first connection cannot be made.
    pub async fn connect(target: &ConnectionTarget, options: &PoolOptions) -> GatewayResult<Self> {
        let backend = target.backend();
        info!(
            connection = %target.redacted(),
            backend = %backend,
            max_connections = options.max_connections,
            "Connecting to database"
        );

        let pool = match target {
            ConnectionTarget::Postgres(settings) => {
                let connect = PgConnectOptions::new()
                    .host(&settings.host)
                    .port(settings.port)
                    .username(&settings.user)
                    .password(&settings.password)
                    .database(&settings.database);
                Self::connect_postgres(connect, options).await?
            }
            ConnectionTarget::Url {
                backend: Backend::PostgreSQL,
                url,
            } => {
                let connect = PgConnectOptions::from_str(url).map_err(|e| {
                    GatewayError::configuration(format!(
                        "Invalid PostgreSQL connection URL: {}",
                        crate::error::sanitize_message(&e.to_string())
                    ))
                })?;
                Self::connect_postgres(connect, options).await?
            }
            ConnectionTarget::Url {
                backend: Backend::SQLite,
                url,
            } => {
                let connect = SqliteConnectOptions::from_str(url)
                    .map_err(|e| {
                        GatewayError::configuration(format!(
                            "Invalid SQLite connection URL: {}",
                            e
                        ))
                    })?
                    .read_only(true);
                let pool = SqlitePoolOptions::new()
                    .min_connections(options.min_connections)
                    .max_connections(options.max_connections)
                    .acquire_timeout(options.acquire_timeout())
                    .idle_timeout(Some(options.idle_timeout()))
                    .test_before_acquire(true)
                    .connect_with(connect)
                    .await
                    .map_err(|e| {
                        GatewayError::connection(
                            format!("Failed to connect: {}", e),
                            connection_suggestion(Backend::SQLite, &e),
                        )
                    })?;
                DbPool::SQLite(pool)
            }
        };

        info!(backend = %backend, "Connected successfully");
        Ok(pool)
    }

    async fn connect_postgres(
        connect: PgConnectOptions,
        options: &PoolOptions,
    ) -> GatewayResult<Self> {
        let connect = connect
            .application_name(APPLICATION_NAME)
            .options([("default_transaction_read_only", "on")]);
        let pool = PgPoolOptions::new()
            .min_connections(options.min_connections)
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout())
            .idle_timeout(Some(options.idle_timeout()))
            .test_before_acquire(true)
            .connect_with(connect)
            .await
            .map_err(|e| {
                GatewayError::connection(
                    format!("Failed to connect: {}", e),
                    connection_suggestion(Backend::PostgreSQL, &e),
                )
            })?;
        Ok(DbPool::Postgres(pool))
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
        info!("Connection pool closed");
    }

    pub fn backend(&self) -> Backend {
        match self {
            DbPool::Postgres(_) => Backend::PostgreSQL,
            DbPool::SQLite(_) => Backend::SQLite,
        }
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        self.backend().placeholder_style()
    }

    /// Get the server version from the connected database.
    pub async fn server_version(&self) -> Option<String> {
        let result = match self {
            DbPool::Postgres(pool) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(pool)
                    .await
            }
            DbPool::SQLite(pool) => {
                sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                    .fetch_one(pool)
                    .await
            }
        };
        match result {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }
}

/// Map a failed `acquire()` to the gateway taxonomy.
pub(crate) fn acquire_error(err: sqlx::Error, acquire_timeout: Duration) -> GatewayError {
    match err {
        sqlx::Error::PoolTimedOut => {
            GatewayError::timeout("connection acquire", acquire_timeout.as_secs())
        }
        other => other.into(),
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(backend: Backend, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            backend
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify POSTGRES_USER and POSTGRES_PASSWORD".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unable to open") {
        return "Check that the database exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or build with a TLS feature".to_string();
    }

    match backend {
        Backend::PostgreSQL => {
            "Verify POSTGRES_HOST, POSTGRES_PORT and POSTGRES_DB (or DATABASE_URL)".to_string()
        }
        Backend::SQLite => {
            "Verify the file path exists and is accessible: sqlite:path/to/db.sqlite".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_timeout_maps_to_timeout() {
        let err = acquire_error(sqlx::Error::PoolTimedOut, Duration::from_secs(7));
        assert!(matches!(
            err,
            GatewayError::Timeout {
                elapsed_secs: 7,
                ..
            }
        ));
    }

    #[test]
    fn test_acquire_other_errors_pass_through() {
        let err = acquire_error(sqlx::Error::PoolClosed, Duration::from_secs(7));
        assert_eq!(err.code(), "CONNECTION_FAILED");
    }

    #[test]
    fn test_connection_suggestion_refused() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused",
        ));
        assert!(connection_suggestion(Backend::PostgreSQL, &err).contains("running"));
    }

    #[tokio::test]
    async fn test_connect_missing_sqlite_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let target = ConnectionTarget::from_url(format!("sqlite:{}", path.display())).unwrap();
        let result = DbPool::connect(&target, &PoolOptions::default()).await;
        assert_eq!(result.unwrap_err().code(), "CONNECTION_FAILED");
    }

    #[tokio::test]
    async fn test_connect_sqlite_read_only() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let target =
            ConnectionTarget::from_url(format!("sqlite:{}", file.path().display())).unwrap();
        let pool = DbPool::connect(&target, &PoolOptions::default()).await.unwrap();
        assert_eq!(pool.backend(), Backend::SQLite);
        assert_eq!(pool.placeholder_style(), PlaceholderStyle::Question);
        assert!(pool.server_version().await.is_some());

        if let DbPool::SQLite(inner) = &pool {
            let write = sqlx::query("CREATE TABLE t (id INTEGER)").execute(inner).await;
            assert!(write.is_err());
        }
        pool.close().await;
    }
}
