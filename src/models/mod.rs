//! Data models for the gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{Backend, ConnectionTarget, PlaceholderStyle, PostgresSettings};
pub use query::{ColumnMetadata, QueryParam, QueryRequest, ResultRow, ResultSet, ScalarValue};
pub use schema::{ColumnConstraint, ColumnDescriptor, SchemaSnapshot, TableDescriptor};
