//! MCP service implementation using rmcp.
//!
//! This module defines the GatewayService struct with the read-only query
//! tools and the schema resource exposed via the MCP protocol.

use crate::config::GatewaySettings;
use crate::db::DbPool;
use crate::error::GatewayError;
use crate::models::TableDescriptor;
use crate::tools::query::{QueryInput, QueryOutput, QueryToolHandler};
use crate::tools::schema::{GetTableSchemaInput, ListTablesOutput, SchemaToolHandler};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{
        AnnotateAble, Implementation, ListResourcesResult, PaginatedRequestParam,
        ProtocolVersion, RawResource, ReadResourceRequestParam, ReadResourceResult, Resource,
        ResourceContents, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tracing::debug;

/// Address of the full-schema resource.
pub const SCHEMA_RESOURCE_URI: &str = "postgres://schema";
const SCHEMA_RESOURCE_NAME: &str = "database-schema";

#[derive(Clone)]
pub struct GatewayService {
    /// Shared pool; every tool call borrows connections from it
    pool: DbPool,
    settings: Arc<GatewaySettings>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl GatewayService {
    pub fn new(pool: DbPool, settings: Arc<GatewaySettings>) -> Self {
        Self {
            pool,
            settings,
            tool_router: Self::tool_router(),
        }
    }

    fn schema_handler(&self) -> SchemaToolHandler {
        SchemaToolHandler::new(self.pool.clone(), &self.settings)
    }

    fn schema_resource() -> Resource {
        let mut resource = RawResource::new(SCHEMA_RESOURCE_URI, SCHEMA_RESOURCE_NAME);
        resource.description =
            Some("Every table of the configured schema with its columns".to_string());
        resource.mime_type = Some("application/json".to_string());
        resource.no_annotation()
    }

    /// Serve the schema resource; any other URI is unknown.
    async fn read_schema_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        if uri != SCHEMA_RESOURCE_URI {
            return Err(GatewayError::resource_not_found(uri).into());
        }

        let snapshot = self.schema_handler().schema_snapshot().await?;
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| GatewayError::internal(format!("Failed to encode schema: {}", e)))?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(json, uri)],
        })
    }
}

#[tool_router]
impl GatewayService {
    #[tool(
        description = "Run a single read-only SELECT statement and return its rows.\nUse placeholders ($1, $2, ... on PostgreSQL) with `parameters` instead of inlining values.\nStatements that write, change schema, or chain several statements are rejected."
    )]
    async fn query_database(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<Json<QueryOutput>, McpError> {
        let handler = QueryToolHandler::new(self.pool.clone(), &self.settings);
        handler.query(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(
        description = "Describe one table: columns in ordinal order with type, nullability, default and constraints (primary key, unique, foreign key, check)."
    )]
    async fn get_table_schema(
        &self,
        Parameters(input): Parameters<GetTableSchemaInput>,
    ) -> Result<Json<TableDescriptor>, McpError> {
        self.schema_handler()
            .get_table_schema(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "List the tables and views of the configured schema, ordered by name.")]
    async fn list_tables(&self) -> Result<Json<ListTablesOutput>, McpError> {
        self.schema_handler()
            .list_tables()
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for GatewayService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "postgres-mcp-server".to_owned(),
                title: Some("PostgreSQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read-only access to a single database.\n\
                \n\
                ## Workflow\n\
                1. Call `list_tables` to see what exists\n\
                2. Call `get_table_schema` for the tables you need\n\
                3. Call `query_database` with one SELECT statement\n\
                \n\
                ## Rules\n\
                - Only a single statement starting with SELECT is accepted\n\
                - Mutating keywords (INSERT, UPDATE, DELETE, DROP, ...) are rejected anywhere in the text\n\
                - Pass values through `parameters`; their count must match the placeholders\n\
                \n\
                The `postgres://schema` resource returns every table description at once."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(vec![Self::schema_resource()]))
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        debug!(uri = %uri, "Reading resource");
        self.read_schema_resource(&uri).await
    }
}
