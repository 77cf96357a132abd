//! Shared fixtures for redload integration tests
//!
//! [`RecordingDatabase`] implements `Database` without a server: it records
//! every call in order and answers with canned values, so tests can assert
//! on the exact SQL an ingestion run produces.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use redload::aws::Identity;
use redload::config::EtlConfig;
use redload::db::{Database, DbError, DbResult, SqlParam};
use redload::ingest::{IngestContext, IngestStrategy, LoadResult, RedshiftTable, UpsertStatements};
use redload::storage::MemoryStorage;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

pub const TEST_BUCKET: &str = "ye-bucket";
pub const TEST_BASE_PATH: &str = "s3://ye-bucket/this/isnt/optional";
pub const TEST_TABLE: &str = "public.test_channels";
pub const TEST_STAGING: &str = "test_channels_2015_11_30_22_36_43";
pub const TEST_CONNECTION_STRING: &str = "aws_access_key_id=aws_mock_key;aws_secret_access_key=aws_mock_secret";

// ============================================================================
// Recording Database
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Execute(String),
    ExecuteWith(String, Vec<SqlParam>),
    Script(String),
    FetchLoadResult(i32),
    CopyIn { copy: String, data: Vec<u8> },
}

pub struct RecordingDatabase {
    name: String,
    strategy: IngestStrategy,
    calls: Mutex<Vec<Call>>,
    copy_id: Option<i32>,
    load_result: Option<LoadResult>,
    /// (statement prefix, rejection message)
    failure: Option<(String, String)>,
}

impl RecordingDatabase {
    pub fn new(strategy: IngestStrategy) -> Self {
        Self {
            name: "redshift".to_string(),
            strategy,
            calls: Mutex::new(Vec::new()),
            copy_id: Some(1234),
            load_result: None,
            failure: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_load_result(mut self, result: LoadResult) -> Self {
        self.load_result = Some(result);
        self
    }

    pub fn with_copy_id(mut self, copy_id: Option<i32>) -> Self {
        self.copy_id = copy_id;
        self
    }

    /// Reject any statement starting with `prefix`
    pub fn failing_on(mut self, prefix: &str, message: &str) -> Self {
        self.failure = Some((prefix.to_string(), message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call, statement: &str) -> DbResult<()> {
        self.calls.lock().unwrap().push(call);
        match self.failure {
            Some((ref prefix, ref message)) if statement.starts_with(prefix.as_str()) => {
                Err(DbError::rejected(message.clone()))
            },
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Database for RecordingDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn ingest_strategy(&self) -> IngestStrategy {
        self.strategy
    }

    async fn execute(&self, sql: &str) -> DbResult<()> {
        self.record(Call::Execute(sql.to_string()), sql)
    }

    async fn execute_with(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        self.record(Call::ExecuteWith(sql.to_string(), params.to_vec()), sql)?;
        Ok(1)
    }

    async fn execute_returning_copy_id(&self, script: &str) -> DbResult<Option<i32>> {
        self.record(Call::Script(script.to_string()), script)?;
        Ok(self.copy_id)
    }

    async fn fetch_load_result(&self, _sql: &str, query_id: i32) -> DbResult<Option<LoadResult>> {
        self.record(Call::FetchLoadResult(query_id), "")?;
        Ok(self.load_result.clone())
    }

    async fn copy_in_transaction(&self, statements: &UpsertStatements, mut source: File) -> DbResult<()> {
        let mut data = Vec::new();
        source
            .read_to_end(&mut data)
            .await
            .map_err(|e| DbError::rejected(e.to_string()))?;

        self.record(
            Call::CopyIn {
                copy: statements.copy.clone(),
                data,
            },
            &statements.create_staging,
        )
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn test_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2015, 11, 30)
        .and_then(|date| date.and_hms_opt(22, 36, 43))
        .unwrap()
}

pub fn test_identity() -> Identity {
    Identity::permanent("aws_mock_key", "aws_mock_secret", Some("us-east-1".to_string()))
}

pub fn test_config(temp_dir: &Path) -> EtlConfig {
    EtlConfig::default()
        .with_s3_base_path(TEST_BASE_PATH)
        .with_local_temp_dir(temp_dir)
}

pub fn destination(database: &Arc<RecordingDatabase>) -> RedshiftTable {
    let database: Arc<dyn Database> = database.clone();
    RedshiftTable::at(database, TEST_TABLE, ["id"], test_timestamp()).unwrap()
}

pub fn context(config: EtlConfig, storage: &Arc<MemoryStorage>) -> IngestContext {
    IngestContext::new(config, test_identity(), storage.clone())
}
