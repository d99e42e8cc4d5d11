//! MCP tool implementations.
//!
//! This module contains the gateway's tool handlers:
//! - `guard`: Statement classification, the read-only boundary
//! - `query`: Execute guarded SELECT statements
//! - `schema`: List tables and describe a table

pub mod guard;
pub mod query;
pub mod schema;

pub use guard::{GuardMode, RejectionReason, StatementGuard, StatementVerdict, classify};
pub use query::{QueryInput, QueryOutput, QueryToolHandler};
pub use schema::{GetTableSchemaInput, ListTablesOutput, SchemaToolHandler};
