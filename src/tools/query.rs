//! Query execution tool.
//!
//! This module implements the `query_database` MCP tool. Statements pass the
//! guard before they reach the pool; rejected statements never touch the
//! database.

use crate::config::GatewaySettings;
use crate::db::{DbPool, QueryExecutor};
use crate::error::GatewayResult;
use crate::models::{ColumnMetadata, QueryParam, QueryRequest, ResultSet};
use crate::tools::guard::StatementGuard;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

/// Input for the query_database tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// A single read-only SELECT statement. Anything else is rejected.
    pub sql: String,
    /// Positional parameters bound to the statement's placeholders ($1, $2, ... for PostgreSQL, ? for SQLite).
    /// PostgreSQL binds strings and null as text; cast the placeholder (`$1::int4`,
    /// `$2::date`) when comparing against a column of another type.
    #[serde(default, alias = "params")]
    pub parameters: Vec<QueryParam>,
}

/// Output from the query_database tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryOutput {
    pub success: bool,
    /// Column names and driver type names, in select-list order
    pub columns: Vec<ColumnMetadata>,
    /// One object per row, keyed by column name
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// True only when a row cap is configured and more rows existed
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl From<ResultSet> for QueryOutput {
    fn from(result: ResultSet) -> Self {
        Self {
            success: true,
            row_count: result.row_count(),
            rows: result.rows.iter().map(|r| r.to_json_map()).collect(),
            columns: result.columns,
            truncated: result.truncated,
            execution_time_ms: result.execution_time_ms,
        }
    }
}

/// Handler for the query tool.
#[derive(Debug, Clone)]
pub struct QueryToolHandler {
    pool: DbPool,
    guard: StatementGuard,
    executor: QueryExecutor,
}

impl QueryToolHandler {
    pub fn new(pool: DbPool, settings: &GatewaySettings) -> Self {
        Self {
            pool,
            guard: StatementGuard::new(settings.guard_mode),
            executor: QueryExecutor::from_settings(settings),
        }
    }

    /// Validate, then execute one statement.
    pub async fn query(&self, input: QueryInput) -> GatewayResult<QueryOutput> {
        let style = self.pool.placeholder_style();
        if let Err(err) = self
            .guard
            .validate(&input.sql, input.parameters.len(), style)
        {
            warn!(code = err.code(), mode = %self.guard.mode(), "Statement rejected");
            return Err(err);
        }

        let request = QueryRequest::new(input.sql).with_params(input.parameters);
        let result = self.executor.execute(&self.pool, &request).await?;

        info!(
            rows = result.row_count(),
            truncated = result.truncated,
            execution_time_ms = result.execution_time_ms,
            "Query executed"
        );

        Ok(result.into())
    }
}
