//! Schema introspection tools.
//!
//! This module implements the `list_tables` and `get_table_schema` MCP tools
//! and builds the snapshot served by the schema resource.

use crate::config::GatewaySettings;
use crate::db::{DbPool, SchemaCatalog};
use crate::error::GatewayResult;
use crate::models::{SchemaSnapshot, TableDescriptor};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input for the get_table_schema tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetTableSchemaInput {
    /// Table or view name, as returned by list_tables
    pub table_name: String,
}

/// Output from the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    /// Table and view names, ordered by name
    pub tables: Vec<String>,
    pub count: usize,
}

/// Handler for schema tools.
#[derive(Debug, Clone)]
pub struct SchemaToolHandler {
    catalog: SchemaCatalog,
}

impl SchemaToolHandler {
    pub fn new(pool: DbPool, settings: &GatewaySettings) -> Self {
        Self {
            catalog: SchemaCatalog::new(pool, settings),
        }
    }

    /// Handle the list_tables tool call.
    pub async fn list_tables(&self) -> GatewayResult<ListTablesOutput> {
        let tables = self.catalog.list_tables().await?;
        info!(schema = %self.catalog.schema_name(), count = tables.len(), "Listed tables");
        Ok(ListTablesOutput {
            count: tables.len(),
            tables,
        })
    }

    /// Handle the get_table_schema tool call.
    pub async fn get_table_schema(
        &self,
        input: GetTableSchemaInput,
    ) -> GatewayResult<TableDescriptor> {
        let table = self.catalog.describe_table(&input.table_name).await?;
        info!(table = %input.table_name, columns = table.columns.len(), "Described table");
        Ok(table)
    }

    /// Every table of the configured schema, for the schema resource.
    pub async fn schema_snapshot(&self) -> GatewayResult<SchemaSnapshot> {
        let snapshot = self.catalog.full_schema().await?;
        info!(schema = %snapshot.schema, tables = snapshot.tables.len(), "Built schema snapshot");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_tables_output_serialization() {
        let output = ListTablesOutput {
            tables: vec!["orders".to_string(), "users".to_string()],
            count: 2,
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"tables": ["orders", "users"], "count": 2})
        );
    }

    #[test]
    fn test_get_table_schema_input() {
        let input: GetTableSchemaInput =
            serde_json::from_str(r#"{"table_name": "users"}"#).unwrap();
        assert_eq!(input.table_name, "users");
    }
}
