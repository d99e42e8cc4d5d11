//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Query execution
//! - Schema introspection
//! - Type mappings

pub mod catalog;
pub mod executor;
pub mod params;
pub mod pool;
pub mod types;

pub use catalog::SchemaCatalog;
pub use executor::QueryExecutor;
pub use pool::DbPool;
