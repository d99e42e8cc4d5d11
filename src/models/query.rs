//! Query-related data models.
//!
//! This module defines types for SQL query requests and results.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

/// A statement plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Executed exactly as submitted.
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter to this query.
    pub fn with_param(mut self, param: QueryParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = QueryParam>) -> Self {
        self.params.extend(params);
        self
    }
}

/// Closed set of values a result cell can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl ScalarValue {
    /// Variant name, for logs and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// JSON rendering. Non-finite floats become strings; timestamps use RFC 3339.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Boolean(b) => JsonValue::Bool(*b),
            Self::Integer(i) => JsonValue::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(f.to_string())),
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Timestamp(ts) => {
                JsonValue::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnMetadata {
    pub name: String,
    /// Driver type name (e.g., "INT4", "TEXT", "TIMESTAMPTZ")
    pub type_name: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// One row, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    values: Vec<(String, ScalarValue)>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: ScalarValue) {
        self.values.push((column.into(), value));
    }

    /// Value of the last column with this name.
    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.values
            .iter()
            .rev()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Column name to JSON value. Duplicate column names keep the last value.
    pub fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

/// Rows returned by one statement, in database order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<ResultRow>,
    /// Set only when a row cap is configured and more rows existed.
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl ResultSet {
    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(
            QueryParam::String("hello".to_string()).type_name(),
            "string"
        );
    }

    #[test]
    fn test_query_param_deserialize_untagged() {
        let params: Vec<QueryParam> =
            serde_json::from_str(r#"[null, true, 7, 1.5, "x"]"#).unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Null,
                QueryParam::Bool(true),
                QueryParam::Int(7),
                QueryParam::Float(1.5),
                QueryParam::String("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_request_builder() {
        let req = QueryRequest::new("SELECT * FROM users WHERE id = $1").with_param(QueryParam::Int(1));
        assert_eq!(req.params.len(), 1);
        assert_eq!(req.sql, "SELECT * FROM users WHERE id = $1");
    }

    #[test]
    fn test_scalar_to_json() {
        assert_eq!(ScalarValue::Null.to_json(), JsonValue::Null);
        assert_eq!(ScalarValue::Integer(-3).to_json(), serde_json::json!(-3));
        assert_eq!(ScalarValue::Float(2.5).to_json(), serde_json::json!(2.5));
        assert_eq!(ScalarValue::Float(f64::NAN).to_json(), serde_json::json!("NaN"));
        assert_eq!(ScalarValue::Boolean(true).to_json(), serde_json::json!(true));
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            ScalarValue::Timestamp(ts).to_json(),
            serde_json::json!("2024-01-02T03:04:05Z")
        );
    }

    #[test]
    fn test_scalar_kind() {
        assert_eq!(ScalarValue::Text("a".into()).kind(), "text");
        assert_eq!(ScalarValue::Null.kind(), "null");
        assert!(ScalarValue::Null.is_null());
    }

    #[test]
    fn test_result_row_keeps_order_and_last_duplicate() {
        let mut row = ResultRow::new();
        row.push("b", ScalarValue::Integer(1));
        row.push("a", ScalarValue::Integer(2));
        row.push("b", ScalarValue::Integer(3));
        let names: Vec<&str> = row.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
        assert_eq!(row.get("b"), Some(&ScalarValue::Integer(3)));
        let map = row.to_json_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["b"], serde_json::json!(3));
    }

    #[test]
    fn test_result_set_counts() {
        let set = ResultSet {
            rows: vec![ResultRow::new(), ResultRow::new()],
            ..ResultSet::default()
        };
        assert_eq!(set.row_count(), 2);
        assert!(!set.is_empty());
        assert!(!set.truncated);
    }
}
