//! Integration tests for PostgreSQL value decoding.
//!
//! Simple queries come back in text format and parameterized ones in binary
//! format; both must render the same values.
//!
//! These tests require a running PostgreSQL server.
//! Set TEST_POSTGRES_URL to run them.

use postgres_mcp_server::config::{GatewaySettings, PoolOptions};
use postgres_mcp_server::db::DbPool;
use postgres_mcp_server::models::{ConnectionTarget, QueryParam};
use postgres_mcp_server::tools::query::{QueryInput, QueryToolHandler};
use serde_json::{Value, json};

const SELECT_VALUES: &str = "SELECT \
    ARRAY['x', 'y'] AS tags, \
    ARRAY['a b', NULL] AS tricky, \
    ARRAY[1, 2, 3]::int4[] AS ids, \
    ARRAY[true, false] AS flags, \
    interval '1 day' AS dur, \
    interval '1 year 2 mons -3 days 04:05:06.5' AS mixed, \
    12.50::numeric AS price, \
    'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11'::uuid AS uid, \
    '10.0.0.1'::inet AS addr, \
    '10.0.0.0/8'::cidr AS net, \
    42::oid AS relid, \
    12.50::money AS cash, \
    point '(1,2)' AS pt";

async fn connect() -> Option<DbPool> {
    let url = match std::env::var("TEST_POSTGRES_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_POSTGRES_URL not set");
            return None;
        }
    };
    let target = ConnectionTarget::from_url(url).unwrap();
    Some(
        DbPool::connect(&target, &PoolOptions::default())
            .await
            .unwrap(),
    )
}

fn input(sql: &str, parameters: Vec<QueryParam>) -> QueryInput {
    QueryInput {
        sql: sql.to_string(),
        parameters,
    }
}

/// Parameterized statements decode the same values as simple ones.
#[tokio::test]
async fn test_parameterized_rows_match_simple_rows() {
    let Some(pool) = connect().await else {
        return;
    };
    let handler = QueryToolHandler::new(pool, &GatewaySettings::default());

    let simple = handler.query(input(SELECT_VALUES, vec![])).await.unwrap();
    let prepared = handler
        .query(input(
            &format!("{} WHERE $1 = 1", SELECT_VALUES),
            vec![QueryParam::Int(1)],
        ))
        .await
        .unwrap();

    let text_row = &simple.rows[0];
    let binary_row = &prepared.rows[0];

    for column in [
        "tags", "tricky", "ids", "flags", "dur", "mixed", "price", "uid", "addr", "net", "relid",
    ] {
        assert_eq!(text_row[column], binary_row[column], "{}", column);
    }

    assert_eq!(binary_row["tags"], json!("{x,y}"));
    assert_eq!(binary_row["tricky"], json!("{\"a b\",NULL}"));
    assert_eq!(binary_row["ids"], json!("{1,2,3}"));
    assert_eq!(binary_row["flags"], json!("{t,f}"));
    assert_eq!(binary_row["dur"], json!("1 day"));
    assert_eq!(binary_row["mixed"], json!("1 year 2 mons -3 days +04:05:06.5"));
    assert_eq!(binary_row["price"], json!("12.50"));
    assert_eq!(
        binary_row["uid"],
        json!("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11")
    );
    assert_eq!(binary_row["addr"], json!("10.0.0.1"));
    assert_eq!(binary_row["net"], json!("10.0.0.0/8"));
    assert_eq!(binary_row["relid"], json!(42));

    // Locale-dependent or without a typed decoder: present, never null.
    assert_eq!(binary_row["cash"], json!("12.50"));
    assert_ne!(binary_row["pt"], Value::Null);
    assert_ne!(text_row["cash"], Value::Null);
}

/// Text parameters need an explicit cast to compare against other types.
#[tokio::test]
async fn test_text_parameter_needs_cast() {
    let Some(pool) = connect().await else {
        return;
    };
    let handler = QueryToolHandler::new(pool, &GatewaySettings::default());

    let err = handler
        .query(input(
            "SELECT 1 AS x WHERE 1::int4 = $1",
            vec![QueryParam::String("1".to_string())],
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "EXECUTION_FAILED");

    let output = handler
        .query(input(
            "SELECT 1 AS x WHERE 1::int4 = $1::int4",
            vec![QueryParam::String("1".to_string())],
        ))
        .await
        .unwrap();
    assert_eq!(output.row_count, 1);
}
