//! PostgreSQL MCP Server Library
//!
//! Read-only MCP tools for AI assistants: guarded SELECT execution and
//! schema introspection over one PostgreSQL (or SQLite) database.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::GatewayError;
pub use mcp::GatewayService;
