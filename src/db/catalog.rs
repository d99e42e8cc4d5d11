//! Schema introspection.
//!
//! SQL is kept in the `queries` submodule, one submodule per backend. Every
//! catalog call borrows a single connection for all of its queries and is
//! bounded by the query timeout. Failures surface as `SCHEMA_QUERY_FAILED`;
//! no partial result is ever returned.

use crate::config::GatewaySettings;
use crate::db::pool::DbPool;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{ColumnConstraint, ColumnDescriptor, SchemaSnapshot, TableDescriptor};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Read-only view of the tables visible to the configured connection.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    pool: DbPool,
    schema_name: String,
    timeout: Duration,
}

impl SchemaCatalog {
    pub fn new(pool: DbPool, settings: &GatewaySettings) -> Self {
        let schema_name = settings.schema_label(pool.backend()).to_string();
        Self {
            pool,
            schema_name,
            timeout: settings.query_timeout,
        }
    }

    /// Schema (PostgreSQL) or database alias (SQLite) being described.
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Table and view names, ordered by name.
    pub async fn list_tables(&self) -> GatewayResult<Vec<String>> {
        let tables = self
            .bounded("list tables", async {
                match &self.pool {
                    DbPool::Postgres(p) => {
                        let mut conn = p.acquire().await.map_err(schema_error)?;
                        postgres::list_tables(&mut conn, &self.schema_name).await
                    }
                    DbPool::SQLite(p) => {
                        let mut conn = p.acquire().await.map_err(schema_error)?;
                        sqlite::list_tables(&mut conn).await
                    }
                }
            })
            .await?;

        debug!(schema = %self.schema_name, count = tables.len(), "Listed tables");
        Ok(tables)
    }

    /// Columns of one table, in ordinal order.
    pub async fn describe_table(&self, table_name: &str) -> GatewayResult<TableDescriptor> {
        if table_name.trim().is_empty() {
            return Err(GatewayError::table_not_found(table_name));
        }

        let table = self
            .bounded("describe table", async {
                match &self.pool {
                    DbPool::Postgres(p) => {
                        let mut conn = p.acquire().await.map_err(schema_error)?;
                        postgres::describe_table(&mut conn, &self.schema_name, table_name).await
                    }
                    DbPool::SQLite(p) => {
                        let mut conn = p.acquire().await.map_err(schema_error)?;
                        sqlite::describe_table(&mut conn, table_name).await
                    }
                }
            })
            .await?;

        debug!(table = %table_name, columns = table.columns.len(), "Described table");
        Ok(table)
    }

    /// Every table, described on one connection.
    pub async fn full_schema(&self) -> GatewayResult<SchemaSnapshot> {
        let tables = self
            .bounded("full schema", async {
                match &self.pool {
                    DbPool::Postgres(p) => {
                        let mut conn = p.acquire().await.map_err(schema_error)?;
                        let names = postgres::list_tables(&mut conn, &self.schema_name).await?;
                        let mut tables = Vec::with_capacity(names.len());
                        for name in &names {
                            let table =
                                postgres::describe_table(&mut conn, &self.schema_name, name).await;
                            tables.push(table.map_err(vanished)?);
                        }
                        Ok(tables)
                    }
                    DbPool::SQLite(p) => {
                        let mut conn = p.acquire().await.map_err(schema_error)?;
                        let names = sqlite::list_tables(&mut conn).await?;
                        let mut tables = Vec::with_capacity(names.len());
                        for name in &names {
                            let table = sqlite::describe_table(&mut conn, name).await;
                            tables.push(table.map_err(vanished)?);
                        }
                        Ok(tables)
                    }
                }
            })
            .await?;

        debug!(schema = %self.schema_name, tables = tables.len(), "Built schema snapshot");
        Ok(SchemaSnapshot {
            schema: self.schema_name.clone(),
            tables,
        })
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = GatewayResult<T>>,
    ) -> GatewayResult<T> {
        match timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::schema_query(format!(
                "{} timed out after {}s",
                operation,
                self.timeout.as_secs()
            ))),
        }
    }
}

fn schema_error(err: sqlx::Error) -> GatewayError {
    GatewayError::schema_query(err.to_string())
}

/// A listed table that can no longer be described breaks the snapshot.
fn vanished(err: GatewayError) -> GatewayError {
    match err {
        GatewayError::TableNotFound { table } => GatewayError::schema_query(format!(
            "Table '{}' disappeared while the schema was being read",
            table
        )),
        other => other,
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1
            ORDER BY table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                column_name::text AS column_name,
                data_type::text AS data_type,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default,
                character_maximum_length::int4 AS max_length
            FROM information_schema.columns
            WHERE table_schema = $1
            AND table_name = $2
            ORDER BY ordinal_position
            "#;

        pub const DESCRIBE_CONSTRAINTS: &str = r#"
            SELECT
                kcu.column_name::text AS column_name,
                tc.constraint_type::text AS constraint_type,
                rkcu.table_name::text AS references_table,
                rkcu.column_name::text AS references_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
                AND tc.table_name = kcu.table_name
            LEFT JOIN information_schema.referential_constraints rc
                ON rc.constraint_name = tc.constraint_name
                AND rc.constraint_schema = tc.constraint_schema
            LEFT JOIN information_schema.key_column_usage rkcu
                ON rkcu.constraint_name = rc.unique_constraint_name
                AND rkcu.constraint_schema = rc.unique_constraint_schema
                AND rkcu.ordinal_position = kcu.position_in_unique_constraint
            WHERE tc.table_schema = $1
            AND tc.table_name = $2
            AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE', 'FOREIGN KEY')
            UNION ALL
            SELECT
                ccu.column_name::text,
                tc.constraint_type::text,
                NULL,
                NULL
            FROM information_schema.table_constraints tc
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.constraint_schema = tc.constraint_schema
            WHERE tc.table_schema = $1
            AND tc.table_name = $2
            AND tc.constraint_type = 'CHECK'
            AND tc.constraint_name NOT LIKE '%_not_null'
            "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name
            FROM sqlite_master
            WHERE type IN ('table', 'view')
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT name, type, "notnull", dflt_value, pk
            FROM pragma_table_info(?)
            ORDER BY cid
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT "from", "table", "to"
            FROM pragma_foreign_key_list(?)
            ORDER BY id, seq
            "#;

        pub const PRIMARY_KEY_COLUMN: &str = r#"
            SELECT name
            FROM pragma_table_info(?)
            WHERE pk = 1
            "#;

        pub const UNIQUE_INDEXES: &str = r#"
            SELECT name
            FROM pragma_index_list(?)
            WHERE "unique" = 1
            AND origin <> 'pk'
            "#;

        pub const INDEX_COLUMNS: &str = r#"
            SELECT name
            FROM pragma_index_info(?)
            ORDER BY seqno
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgConnection, Row};

    pub async fn list_tables(conn: &mut PgConnection, schema: &str) -> GatewayResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(queries::postgres::LIST_TABLES)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await
            .map_err(schema_error)
    }

    pub async fn describe_table(
        conn: &mut PgConnection,
        schema: &str,
        table_name: &str,
    ) -> GatewayResult<TableDescriptor> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(schema)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await
            .map_err(schema_error)?;

        if rows.is_empty() {
            return Err(GatewayError::table_not_found(table_name));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("column_name").map_err(schema_error)?;
            let data_type: String = row.try_get("data_type").map_err(schema_error)?;
            let is_nullable: String = row.try_get("is_nullable").map_err(schema_error)?;
            let default_value: Option<String> =
                row.try_get("column_default").map_err(schema_error)?;
            let max_length: Option<i32> = row.try_get("max_length").map_err(schema_error)?;

            let mut column = ColumnDescriptor::new(name, data_type, is_nullable == "YES");
            column.default_value = default_value;
            column.max_length = max_length;
            columns.push(column);
        }

        let constraint_rows = sqlx::query(queries::postgres::DESCRIBE_CONSTRAINTS)
            .bind(schema)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await
            .map_err(schema_error)?;

        for row in &constraint_rows {
            let column_name: Option<String> = row.try_get("column_name").map_err(schema_error)?;
            let constraint_type: String = row.try_get("constraint_type").map_err(schema_error)?;
            let Some(column) = column_name
                .as_deref()
                .and_then(|n| columns.iter_mut().find(|c| c.name == n))
            else {
                continue;
            };

            let constraint = if constraint_type == "FOREIGN KEY" {
                let table: Option<String> =
                    row.try_get("references_table").map_err(schema_error)?;
                let target: Option<String> =
                    row.try_get("references_column").map_err(schema_error)?;
                match (table, target) {
                    (Some(table), Some(target)) => Some(ColumnConstraint::foreign_key(table, target)),
                    _ => None,
                }
            } else {
                ColumnConstraint::from_catalog_type(&constraint_type)
            };

            if let Some(constraint) = constraint {
                column.add_constraint(constraint);
            }
        }

        Ok(TableDescriptor::new(table_name, columns))
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqliteConnection};

    pub async fn list_tables(conn: &mut SqliteConnection) -> GatewayResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(queries::sqlite::LIST_TABLES)
            .fetch_all(&mut *conn)
            .await
            .map_err(schema_error)
    }

    pub async fn describe_table(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> GatewayResult<TableDescriptor> {
        let rows = sqlx::query(queries::sqlite::DESCRIBE_COLUMNS)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await
            .map_err(schema_error)?;

        if rows.is_empty() {
            return Err(GatewayError::table_not_found(table_name));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name").map_err(schema_error)?;
            let data_type: String = row.try_get("type").map_err(schema_error)?;
            let notnull: i64 = row.try_get("notnull").map_err(schema_error)?;
            let default_value: Option<String> = row.try_get("dflt_value").map_err(schema_error)?;
            let pk: i64 = row.try_get("pk").map_err(schema_error)?;

            let mut column = ColumnDescriptor::new(name, data_type, notnull == 0);
            column.default_value = default_value;
            if pk > 0 {
                column.add_constraint(ColumnConstraint::PrimaryKey);
            }
            columns.push(column);
        }

        for (from, constraint) in foreign_keys(conn, table_name).await? {
            if let Some(column) = columns.iter_mut().find(|c| c.name == from) {
                column.add_constraint(constraint);
            }
        }

        for name in unique_columns(conn, table_name).await? {
            if let Some(column) = columns.iter_mut().find(|c| c.name == name) {
                column.add_constraint(ColumnConstraint::Unique);
            }
        }

        Ok(TableDescriptor::new(table_name, columns))
    }

    async fn foreign_keys(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> GatewayResult<Vec<(String, ColumnConstraint)>> {
        let rows = sqlx::query(queries::sqlite::FOREIGN_KEYS)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await
            .map_err(schema_error)?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let from: String = row.try_get("from").map_err(schema_error)?;
            let table: String = row.try_get("table").map_err(schema_error)?;
            let to: Option<String> = row.try_get("to").map_err(schema_error)?;

            // `REFERENCES parent` without a column targets the parent's primary key
            let target = match to {
                Some(to) => to,
                None => sqlx::query_scalar::<_, String>(queries::sqlite::PRIMARY_KEY_COLUMN)
                    .bind(&table)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(schema_error)?
                    .unwrap_or_else(|| "rowid".to_string()),
            };
            keys.push((from, ColumnConstraint::foreign_key(table, target)));
        }
        Ok(keys)
    }

    /// Columns covered alone by a UNIQUE index or constraint.
    async fn unique_columns(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> GatewayResult<Vec<String>> {
        let indexes = sqlx::query_scalar::<_, String>(queries::sqlite::UNIQUE_INDEXES)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await
            .map_err(schema_error)?;

        let mut unique = Vec::new();
        for index in &indexes {
            let columns = sqlx::query_scalar::<_, Option<String>>(queries::sqlite::INDEX_COLUMNS)
                .bind(index)
                .fetch_all(&mut *conn)
                .await
                .map_err(schema_error)?;
            if let [Some(column)] = columns.as_slice() {
                unique.push(column.clone());
            }
        }
        Ok(unique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vanished_table_becomes_schema_failure() {
        let err = vanished(GatewayError::table_not_found("orders"));
        assert_eq!(err.code(), "SCHEMA_QUERY_FAILED");
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn test_vanished_keeps_other_errors() {
        let err = vanished(GatewayError::schema_query("boom"));
        assert_eq!(err.code(), "SCHEMA_QUERY_FAILED");
        assert_eq!(err.to_string(), "Schema query failed: boom");
    }

    #[test]
    fn test_driver_error_maps_to_schema_failure() {
        let err = schema_error(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), "SCHEMA_QUERY_FAILED");
    }
}
