//! Audit trail for loads
//!
//! One row per audited load in the audit table (default
//! `public.v1_ingest_audit`), created by an external migration:
//!
//! | column | type |
//! |---|---|
//! | `uuid` | unique text key |
//! | `loaded_at` | timestamp |
//! | `schema_name` | text |
//! | `table_name` | text |
//! | `detail` | large text, JSON |

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::RedshiftTable;
use crate::db::SqlParam;
use crate::error::EtlResult;

/// Detail written when there is nothing to report.
pub const EMPTY_DETAIL: &str = "{}";

/// Load outcome from the load-error and load-commit system views.
pub const LOAD_RESULT_QUERY: &str = "SELECT COALESCE(load_errors.query, load_commits.query) AS query_id
, BTRIM(COALESCE(load_errors.filename, load_commits.filename)) AS filename
, load_commits.lines_scanned
, load_errors.colname AS column_name
, load_errors.type AS column_type
, load_errors.col_length AS column_length
, load_errors.position AS error_row_number
, load_errors.raw_field_value
, load_errors.err_code AS error_code
, load_errors.err_reason
FROM STL_LOAD_ERRORS load_errors
FULL OUTER JOIN STL_LOAD_COMMITS load_commits
ON load_errors.query = load_commits.query
WHERE COALESCE(load_errors.query, load_commits.query) = $1";

/// Marker row written before a load starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub uuid: String,
    pub loaded_at: NaiveDateTime,
    pub schema_name: String,
    pub table_name: String,
}

impl AuditRecord {
    pub fn new(destination: &RedshiftTable) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string().to_uppercase(),
            loaded_at: Utc::now().naive_utc(),
            schema_name: destination.schema_name().to_string(),
            table_name: destination.table_name().to_string(),
        }
    }

    pub fn insert_params(&self) -> Vec<SqlParam> {
        vec![
            SqlParam::Text(self.uuid.clone()),
            SqlParam::Timestamp(self.loaded_at),
            SqlParam::Text(self.schema_name.clone()),
            SqlParam::Text(self.table_name.clone()),
        ]
    }

    pub fn update_params(&self, detail: &str) -> Vec<SqlParam> {
        vec![SqlParam::Text(detail.to_string()), SqlParam::Text(self.uuid.clone())]
    }
}

pub fn insert_audit_sql(audit_table: &str) -> String {
    format!(
        "INSERT INTO {} (uuid, loaded_at, schema_name, table_name) VALUES ($1, $2, $3, $4)",
        audit_table
    )
}

pub fn update_detail_sql(audit_table: &str) -> String {
    format!("UPDATE {} SET detail = $1 WHERE uuid = $2", audit_table)
}

/// One row of [`LOAD_RESULT_QUERY`]
///
/// Field order is the JSON key order of the audit detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LoadResult {
    pub query_id: Option<i32>,
    pub filename: Option<String>,
    pub lines_scanned: Option<i32>,
    pub column_name: Option<String>,
    pub column_type: Option<String>,
    pub column_length: Option<String>,
    pub error_row_number: Option<i32>,
    pub raw_field_value: Option<String>,
    pub error_code: Option<i32>,
    pub err_reason: Option<String>,
}

/// Audit detail JSON for a load result
pub fn load_detail(result: Option<&LoadResult>) -> EtlResult<String> {
    match result {
        Some(result) => Ok(serde_json::to_string(result)?),
        None => Ok(EMPTY_DETAIL.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_key_order() {
        let result = LoadResult {
            query_id: Some(1234),
            filename: Some("s3://ye-bucket/file.csv".to_string()),
            lines_scanned: Some(2),
            ..Default::default()
        };

        let detail = load_detail(Some(&result)).unwrap();
        let keys: Vec<String> = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&detail)
            .map(|map| map.keys().cloned().collect())
            .unwrap();

        assert!(detail.starts_with(r#"{"query_id":1234,"filename":"s3://ye-bucket/file.csv","lines_scanned":2"#));
        assert_eq!(keys.len(), 10);
        assert!(detail.ends_with(r#""error_code":null,"err_reason":null}"#));
    }

    #[test]
    fn test_missing_result_is_empty_object() {
        assert_eq!(load_detail(None).unwrap(), "{}");
    }

    #[test]
    fn test_audit_sql() {
        assert_eq!(
            insert_audit_sql("public.v1_ingest_audit"),
            "INSERT INTO public.v1_ingest_audit (uuid, loaded_at, schema_name, table_name) VALUES ($1, $2, $3, $4)"
        );
        assert_eq!(
            update_detail_sql("public.v1_ingest_audit"),
            "UPDATE public.v1_ingest_audit SET detail = $1 WHERE uuid = $2"
        );
    }

    #[test]
    fn test_load_result_query_filters_on_query_id() {
        assert!(LOAD_RESULT_QUERY.contains("FULL OUTER JOIN STL_LOAD_COMMITS"));
        assert!(LOAD_RESULT_QUERY.ends_with("= $1"));
    }
}
