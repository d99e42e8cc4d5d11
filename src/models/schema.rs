//! Schema-related data models.
//!
//! This module defines the descriptors produced by schema introspection.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Constraint a column takes part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnConstraint {
    PrimaryKey,
    Unique,
    ForeignKey {
        references_table: String,
        references_column: String,
    },
    Check,
}

impl ColumnConstraint {
    pub fn foreign_key(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ForeignKey {
            references_table: table.into(),
            references_column: column.into(),
        }
    }

    /// Parse a catalog constraint type (`PRIMARY KEY`, `UNIQUE`, `CHECK`).
    /// Foreign keys need their target and are built with [`Self::foreign_key`].
    pub fn from_catalog_type(constraint_type: &str) -> Option<Self> {
        match constraint_type.to_uppercase().as_str() {
            "PRIMARY KEY" => Some(Self::PrimaryKey),
            "UNIQUE" => Some(Self::Unique),
            "CHECK" => Some(Self::Check),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type as reported by the catalog (e.g., `integer`, `character varying`)
    pub data_type: String,
    pub nullable: bool,
    /// Default expression as stored in the catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnDescriptor {
    /// Create a new column descriptor.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            max_length: None,
            constraints: Vec::new(),
        }
    }

    /// Add a constraint, ignoring duplicates. A primary key forces NOT NULL.
    pub fn with_constraint(mut self, constraint: ColumnConstraint) -> Self {
        self.add_constraint(constraint);
        self
    }

    pub fn add_constraint(&mut self, constraint: ColumnConstraint) {
        if constraint == ColumnConstraint::PrimaryKey {
            self.nullable = false;
        }
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::PrimaryKey)
    }

    pub fn is_unique(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::Unique)
    }

    /// Referenced `(table, column)` of the first foreign key, if any.
    pub fn foreign_key(&self) -> Option<(&str, &str)> {
        self.constraints.iter().find_map(|c| match c {
            ColumnConstraint::ForeignKey {
                references_table,
                references_column,
            } => Some((references_table.as_str(), references_column.as_str())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableDescriptor {
    pub table_name: String,
    /// Ordered by ordinal position
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Vec<String>,
}

impl TableDescriptor {
    /// Build a descriptor; the primary key list is derived from the columns.
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        let primary_key = columns
            .iter()
            .filter(|c| c.is_primary_key())
            .map(|c| c.name.clone())
            .collect();
        Self {
            table_name: table_name.into(),
            columns,
            primary_key,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Every table of one schema, in table-name order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaSnapshot {
    pub schema: String,
    pub tables: Vec<TableDescriptor>,
}

impl SchemaSnapshot {
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.table_name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_from_catalog_type() {
        assert_eq!(
            ColumnConstraint::from_catalog_type("PRIMARY KEY"),
            Some(ColumnConstraint::PrimaryKey)
        );
        assert_eq!(
            ColumnConstraint::from_catalog_type("unique"),
            Some(ColumnConstraint::Unique)
        );
        assert_eq!(
            ColumnConstraint::from_catalog_type("CHECK"),
            Some(ColumnConstraint::Check)
        );
        assert_eq!(ColumnConstraint::from_catalog_type("FOREIGN KEY"), None);
    }

    #[test]
    fn test_primary_key_forces_not_null() {
        let col = ColumnDescriptor::new("id", "integer", true)
            .with_constraint(ColumnConstraint::PrimaryKey);
        assert!(!col.nullable);
        assert!(col.is_primary_key());
    }

    #[test]
    fn test_duplicate_constraints_ignored() {
        let col = ColumnDescriptor::new("email", "text", true)
            .with_constraint(ColumnConstraint::Unique)
            .with_constraint(ColumnConstraint::Unique);
        assert_eq!(col.constraints.len(), 1);
        assert!(col.is_unique());
    }

    #[test]
    fn test_foreign_key_lookup() {
        let col = ColumnDescriptor::new("user_id", "integer", false)
            .with_constraint(ColumnConstraint::foreign_key("users", "id"));
        assert_eq!(col.foreign_key(), Some(("users", "id")));
    }

    #[test]
    fn test_table_descriptor_primary_key() {
        let table = TableDescriptor::new(
            "users",
            vec![
                ColumnDescriptor::new("id", "integer", false)
                    .with_constraint(ColumnConstraint::PrimaryKey),
                ColumnDescriptor::new("name", "text", false),
            ],
        );
        assert_eq!(table.primary_key, vec!["id"]);
        assert!(table.column("name").is_some());
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_column_serialization() {
        let col = ColumnDescriptor::new("user_id", "integer", false)
            .with_constraint(ColumnConstraint::foreign_key("users", "id"));
        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "user_id",
                "data_type": "integer",
                "nullable": false,
                "constraints": [
                    {"kind": "foreign_key", "references_table": "users", "references_column": "id"}
                ]
            })
        );
    }

    #[test]
    fn test_column_serialization_skips_empty_fields() {
        let col = ColumnDescriptor::new("email", "text", true);
        let json = serde_json::to_string(&col).unwrap();
        assert!(!json.contains("default_value"));
        assert!(!json.contains("max_length"));
        assert!(!json.contains("constraints"));
    }
}
