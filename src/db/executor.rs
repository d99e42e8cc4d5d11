//! Query execution engine.
//!
//! Each statement runs on one pooled connection:
//! - statements without parameters use the simple-query path
//! - statements with parameters are prepared and bound
//! - acquire plus fetch is bounded by the query timeout
//! - an optional row cap fetches at most `cap + 1` rows to detect truncation
//!
//! The backend submodules are kept parallel so differences stand out.

use crate::config::GatewaySettings;
use crate::db::pool::{DbPool, acquire_error};
use crate::db::types::DecodeRow;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{QueryRequest, ResultSet};
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs validated statements against the pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    query_timeout: Duration,
    acquire_timeout: Duration,
    max_rows: Option<u32>,
}

impl QueryExecutor {
    pub fn new(query_timeout: Duration, acquire_timeout: Duration) -> Self {
        Self {
            query_timeout,
            acquire_timeout,
            max_rows: None,
        }
    }

    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self::new(settings.query_timeout, settings.acquire_timeout).with_max_rows(settings.max_rows)
    }

    pub fn with_max_rows(mut self, max_rows: Option<u32>) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Execute a statement and return every row (or the capped prefix).
    ///
    /// The statement must already have passed the guard.
    pub async fn execute(&self, pool: &DbPool, request: &QueryRequest) -> GatewayResult<ResultSet> {
        let start = Instant::now();
        let fetch_limit = self.max_rows.map(|cap| cap as usize + 1);

        debug!(
            sql = %request.sql,
            params = request.params.len(),
            max_rows = ?self.max_rows,
            timeout_secs = self.query_timeout.as_secs(),
            "Executing query"
        );

        match pool {
            DbPool::Postgres(p) => {
                let fut = postgres::fetch_rows(p, request, fetch_limit, self.acquire_timeout);
                match timeout(self.query_timeout, fut).await {
                    Ok(rows) => self.process_rows(rows?, start),
                    Err(_) => Err(self.timeout_error()),
                }
            }
            DbPool::SQLite(p) => {
                let fut = sqlite::fetch_rows(p, request, fetch_limit, self.acquire_timeout);
                match timeout(self.query_timeout, fut).await {
                    Ok(rows) => self.process_rows(rows?, start),
                    Err(_) => Err(self.timeout_error()),
                }
            }
        }
    }

    fn timeout_error(&self) -> GatewayError {
        GatewayError::timeout("query execution", self.query_timeout.as_secs())
    }

    /// Decode fetched rows and apply the row cap.
    fn process_rows<R: DecodeRow>(&self, rows: Vec<R>, start: Instant) -> GatewayResult<ResultSet> {
        let columns = rows
            .first()
            .map(|r| r.column_metadata())
            .unwrap_or_default();

        let total_rows = rows.len();
        let keep = match self.max_rows {
            Some(cap) => (cap as usize).min(total_rows),
            None => total_rows,
        };
        let truncated = keep < total_rows;

        let decoded = rows.iter().take(keep).map(|r| r.decode_row()).collect();

        if truncated {
            warn!(max_rows = keep, "Query result truncated");
        }

        Ok(ResultSet {
            columns,
            rows: decoded,
            truncated,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::from_settings(&GatewaySettings::default())
    }
}

async fn collect_rows<R>(
    stream: BoxStream<'_, Result<R, sqlx::Error>>,
    fetch_limit: Option<usize>,
) -> GatewayResult<Vec<R>> {
    let rows = match fetch_limit {
        Some(limit) => stream.take(limit).try_collect().await,
        None => stream.try_collect().await,
    };
    rows.map_err(GatewayError::from)
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::PgPool;
    use sqlx::postgres::PgRow;

    pub async fn fetch_rows(
        pool: &PgPool,
        request: &QueryRequest,
        fetch_limit: Option<usize>,
        acquire_timeout: Duration,
    ) -> GatewayResult<Vec<PgRow>> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| acquire_error(e, acquire_timeout))?;

        let stream = if request.params.is_empty() {
            sqlx::Executor::fetch(&mut *conn, request.sql.as_str())
        } else {
            let mut query = sqlx::query(&request.sql);
            for param in &request.params {
                query = bind_postgres_param(query, param);
            }
            query.fetch(&mut *conn)
        };
        collect_rows(stream, fetch_limit).await
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        pool: &SqlitePool,
        request: &QueryRequest,
        fetch_limit: Option<usize>,
        acquire_timeout: Duration,
    ) -> GatewayResult<Vec<SqliteRow>> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| acquire_error(e, acquire_timeout))?;

        let stream = if request.params.is_empty() {
            sqlx::Executor::fetch(&mut *conn, request.sql.as_str())
        } else {
            let mut query = sqlx::query(&request.sql);
            for param in &request.params {
                query = bind_sqlite_param(query, param);
            }
            query.fetch(&mut *conn)
        };
        collect_rows(stream, fetch_limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_defaults() {
        let executor = QueryExecutor::default();
        assert_eq!(executor.query_timeout, Duration::from_secs(60));
        assert_eq!(executor.max_rows, None);
    }

    #[test]
    fn test_executor_custom_settings() {
        let executor = QueryExecutor::new(Duration::from_secs(5), Duration::from_secs(2))
            .with_max_rows(Some(100));
        assert_eq!(executor.query_timeout, Duration::from_secs(5));
        assert_eq!(executor.acquire_timeout, Duration::from_secs(2));
        assert_eq!(executor.max_rows, Some(100));
    }

    #[test]
    fn test_timeout_error_code() {
        let executor = QueryExecutor::new(Duration::from_secs(3), Duration::from_secs(1));
        let err = executor.timeout_error();
        assert_eq!(err.code(), "QUERY_TIMEOUT");
        assert!(err.to_string().contains("query execution"));
    }
}
