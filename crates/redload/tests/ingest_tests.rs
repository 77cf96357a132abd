//! Orchestrator tests against a recording database
//!
//! Coverage includes:
//! - Exact staging/merge SQL for each strategy
//! - Audit row lifecycle and load detail
//! - VACUUM conflict handling
//! - Failure states

use redload::db::SqlParam;
use redload::error::EtlError;
use redload::ingest::{
    IngestOptions, IngestState, IngestStrategy, Ingestor, LoadResult, LoadSource, RedshiftTable,
};
use std::sync::Arc;

mod common;
use common::{
    destination, test_config, test_timestamp, Call, RecordingDatabase, TEST_CONNECTION_STRING, TEST_STAGING,
    TEST_TABLE,
};

const SOURCE: &str = "s3://ye-bucket/this/isnt/optional/data.csv";

fn expected_script() -> String {
    format!(
        "BEGIN TRANSACTION;\n\
         CREATE TEMP TABLE {s} (LIKE {t});\n\
         COPY {s} FROM '{src}' WITH CREDENTIALS '{cs}' EMPTYASNULL BLANKSASNULL TIMEFORMAT AS 'auto' STATUPDATE ON CSV IGNOREBLANKLINES;\n\
         DELETE FROM {t} USING {s} WHERE ({t}.id = {s}.id);\n\
         INSERT INTO {t} SELECT * FROM {s};\n\
         DROP TABLE {s};\n\
         END TRANSACTION;",
        s = TEST_STAGING,
        t = TEST_TABLE,
        src = SOURCE,
        cs = TEST_CONNECTION_STRING,
    )
}

fn ingestor(database: &Arc<RecordingDatabase>, options: IngestOptions) -> Ingestor {
    let dir = std::env::temp_dir();
    Ingestor::new(
        LoadSource::Object(SOURCE.to_string()),
        destination(database),
        options,
        TEST_CONNECTION_STRING,
        &test_config(&dir),
    )
    .unwrap()
}

// ============================================================================
// Basic Upsert
// ============================================================================

#[tokio::test]
async fn test_basic_upsert_runs_one_transaction() {
    let database = Arc::new(RecordingDatabase::new(IngestStrategy::BasicUpsert));
    let mut ingestor = ingestor(&database, IngestOptions::new());

    let report = ingestor.run().await.unwrap();

    assert_eq!(database.calls(), vec![Call::Execute(expected_script())]);
    assert_eq!(ingestor.state(), IngestState::Done);
    assert_eq!(report.audit_id, None);
    assert_eq!(report.detail, None);
    assert_eq!(report.staging_table, TEST_STAGING);
}

#[tokio::test]
async fn test_merge_matches_on_every_key_column() {
    let database = Arc::new(RecordingDatabase::new(IngestStrategy::BasicUpsert));
    let dyn_database: Arc<dyn redload::db::Database> = database.clone();
    let destination =
        RedshiftTable::at(dyn_database, TEST_TABLE, ["channel_id", "day"], test_timestamp()).unwrap();

    let statements = Ingestor::new(
        LoadSource::Object(SOURCE.to_string()),
        destination,
        IngestOptions::new(),
        TEST_CONNECTION_STRING,
        &test_config(&std::env::temp_dir()),
    )
    .unwrap()
    .statements();

    assert_eq!(
        statements.delete,
        format!(
            "DELETE FROM {t} USING {s} WHERE ({t}.channel_id = {s}.channel_id AND {t}.day = {s}.day)",
            t = TEST_TABLE,
            s = TEST_STAGING
        )
    );
}

#[tokio::test]
async fn test_dedupe_inserts_distinct_rows() {
    let database = Arc::new(RecordingDatabase::new(IngestStrategy::BasicUpsert));
    let statements = ingestor(&database, IngestOptions::new().with_dedupe()).statements();

    assert_eq!(
        statements.insert,
        format!("INSERT INTO {} SELECT DISTINCT * FROM {}", TEST_TABLE, TEST_STAGING)
    );
}

#[tokio::test]
async fn test_temporary_credentials_reach_copy_statement() {
    let database = Arc::new(RecordingDatabase::new(IngestStrategy::BasicUpsert));
    let identity = redload::aws::Identity::temporary("k", "s", "t", None);

    let statements = Ingestor::new(
        LoadSource::Object(SOURCE.to_string()),
        destination(&database),
        IngestOptions::new().with_gzip(),
        identity.connection_string(),
        &test_config(&std::env::temp_dir()),
    )
    .unwrap()
    .statements();

    assert!(statements
        .copy
        .contains("WITH CREDENTIALS 'aws_access_key_id=k;aws_secret_access_key=s;token=t' "));
    assert!(statements.copy.contains("STATUPDATE ON GZIP CSV IGNOREBLANKLINES"));
}

#[tokio::test]
async fn test_failed_transaction_marks_job_failed() {
    let database = Arc::new(
        RecordingDatabase::new(IngestStrategy::BasicUpsert).failing_on("BEGIN", "relation does not exist"),
    );
    let mut ingestor = ingestor(&database, IngestOptions::new());

    let err = ingestor.run().await.unwrap_err();

    assert!(matches!(err, EtlError::Database(_)));
    assert!(err.to_string().contains("relation does not exist"));
    assert_eq!(ingestor.state(), IngestState::Failed);
}

#[tokio::test]
async fn test_job_runs_only_once() {
    let database = Arc::new(RecordingDatabase::new(IngestStrategy::BasicUpsert));
    let mut ingestor = ingestor(&database, IngestOptions::new());

    ingestor.run().await.unwrap();
    assert!(ingestor.run().await.is_err());
    assert_eq!(database.calls().len(), 1);
}

// ============================================================================
// Audited Upsert
// ============================================================================

#[tokio::test]
async fn test_audited_upsert_phase_order() {
    let load_result = LoadResult {
        query_id: Some(1234),
        filename: Some(SOURCE.to_string()),
        lines_scanned: Some(2),
        ..Default::default()
    };
    let database = Arc::new(RecordingDatabase::new(IngestStrategy::AuditedUpsert).with_load_result(load_result));
    let mut ingestor = ingestor(&database, IngestOptions::new());

    let report = ingestor.run().await.unwrap();
    let calls = database.calls();
    assert_eq!(calls.len(), 5);

    // audit marker
    let audit_id = match calls[0] {
        Call::ExecuteWith(ref sql, ref params) => {
            assert_eq!(
                sql,
                "INSERT INTO public.v1_ingest_audit (uuid, loaded_at, schema_name, table_name) VALUES ($1, $2, $3, $4)"
            );
            assert_eq!(params.len(), 4);
            assert!(matches!(params[1], SqlParam::Timestamp(_)));
            assert_eq!(params[2], SqlParam::Text("public".to_string()));
            assert_eq!(params[3], SqlParam::Text("test_channels".to_string()));
            match params[0] {
                SqlParam::Text(ref uuid) => uuid.clone(),
                ref other => panic!("unexpected uuid param {:?}", other),
            }
        },
        ref other => panic!("unexpected first call {:?}", other),
    };
    assert_eq!(audit_id.len(), 36);
    assert_eq!(audit_id, audit_id.to_uppercase());

    assert_eq!(calls[1], Call::Script(format!("{}\nSELECT PG_LAST_COPY_ID();", expected_script())));
    assert_eq!(calls[2], Call::FetchLoadResult(1234));

    match calls[3] {
        Call::ExecuteWith(ref sql, ref params) => {
            assert_eq!(sql, "UPDATE public.v1_ingest_audit SET detail = $1 WHERE uuid = $2");
            assert_eq!(params[1], SqlParam::Text(audit_id.clone()));
            let detail = match params[0] {
                SqlParam::Text(ref detail) => detail.clone(),
                ref other => panic!("unexpected detail param {:?}", other),
            };
            let parsed: serde_json::Value = serde_json::from_str(&detail).unwrap();
            assert_eq!(parsed["query_id"], 1234);
            assert_eq!(parsed["lines_scanned"], 2);
        },
        ref other => panic!("unexpected fourth call {:?}", other),
    }

    assert_eq!(calls[4], Call::Execute(format!("VACUUM {};", TEST_TABLE)));

    assert_eq!(report.audit_id.as_deref(), Some(audit_id.as_str()));
    assert_eq!(report.load_query_id, Some(1234));
}

#[tokio::test]
async fn test_audited_upsert_without_load_row_writes_empty_detail() {
    let database = Arc::new(RecordingDatabase::new(IngestStrategy::AuditedUpsert));
    let mut ingestor = ingestor(&database, IngestOptions::new());

    let report = ingestor.run().await.unwrap();

    assert_eq!(report.detail.as_deref(), Some("{}"));
}

#[tokio::test]
async fn test_custom_audit_table() {
    let database = Arc::new(RecordingDatabase::new(IngestStrategy::AuditedUpsert));
    let config = test_config(&std::env::temp_dir()).with_audit_table("etl.load_audit");
    let mut ingestor = Ingestor::new(
        LoadSource::Object(SOURCE.to_string()),
        destination(&database),
        IngestOptions::new(),
        TEST_CONNECTION_STRING,
        &config,
    )
    .unwrap()
    .without_vacuum();

    ingestor.run().await.unwrap();
    let calls = database.calls();

    assert!(matches!(calls[0], Call::ExecuteWith(ref sql, _) if sql.starts_with("INSERT INTO etl.load_audit ")));
    assert!(!calls.iter().any(|call| matches!(call, Call::Execute(sql) if sql.starts_with("VACUUM"))));
}

// ============================================================================
// Cleanup
// ============================================================================

#[tokio::test]
async fn test_concurrent_vacuum_is_swallowed() {
    let database = Arc::new(
        RecordingDatabase::new(IngestStrategy::AuditedUpsert)
            .failing_on("VACUUM", "ERROR: VACUUM is running. HINT: re-execute after current VACUUM completes"),
    );
    let mut ingestor = ingestor(&database, IngestOptions::new());

    let report = ingestor.run().await.unwrap();

    assert_eq!(ingestor.state(), IngestState::Done);
    assert_eq!(report.detail.as_deref(), Some("{}"));
}

#[tokio::test]
async fn test_other_vacuum_errors_propagate() {
    let database = Arc::new(
        RecordingDatabase::new(IngestStrategy::AuditedUpsert)
            .failing_on("VACUUM", "permission denied for relation test_channels"),
    );
    let mut ingestor = ingestor(&database, IngestOptions::new());

    let err = ingestor.run().await.unwrap_err();

    assert!(err.to_string().contains("permission denied"));
    assert_eq!(ingestor.state(), IngestState::Failed);
    // the merge itself went through before cleanup failed
    assert!(database.calls().iter().any(|call| matches!(call, Call::Script(_))));
}

// ============================================================================
// Strategy/source compatibility
// ============================================================================

#[tokio::test]
async fn test_postgres_strategy_rejects_manifest() {
    let database = Arc::new(RecordingDatabase::new(IngestStrategy::AuditedUpsertToPostgres));

    let err = Ingestor::new(
        LoadSource::LocalFile(std::env::temp_dir().join("rows.csv")),
        destination(&database),
        IngestOptions::new().with_manifest(),
        "",
        &test_config(&std::env::temp_dir()),
    )
    .unwrap_err();

    assert_eq!(err.to_string(), "Postgres cannot handle manifests like redshift. Sorry.");
    assert!(database.calls().is_empty());
}

#[tokio::test]
async fn test_warehouse_strategy_rejects_local_file() {
    let database = Arc::new(RecordingDatabase::new(IngestStrategy::AuditedUpsert));

    let result = Ingestor::new(
        LoadSource::LocalFile(std::env::temp_dir().join("rows.csv")),
        destination(&database),
        IngestOptions::new(),
        TEST_CONNECTION_STRING,
        &test_config(&std::env::temp_dir()),
    );

    assert!(matches!(result, Err(EtlError::Unsupported(_))));
}
