//! Ingestion orchestrator
//!
//! An [`Ingestor`] runs one job through `before_ingest -> ingest ->
//! after_ingest -> cleanup`. Which of those phases do work depends on the
//! [`IngestStrategy`] of the destination's database:
//!
//! - `BasicUpsert`: one staging/merge transaction, nothing else.
//! - `AuditedUpsert`: writes an audit row first, records the COPY's query
//!   id, attaches the load diagnostics to the audit row, then VACUUMs.
//! - `AuditedUpsertToPostgres`: the audited flow against a local Postgres,
//!   streaming a downloaded file over the connection instead of COPYing
//!   from object storage. It has no load diagnostics; the detail is `{}`.
//!
//! There is no retry; a failed job ends in [`IngestState::Failed`] and the
//! error is returned as-is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::audit::{
    insert_audit_sql, load_detail, update_detail_sql, AuditRecord, EMPTY_DETAIL, LOAD_RESULT_QUERY,
};
use super::{IngestOptions, RedshiftTable, UpsertStatements};
use crate::aws::Identity;
use crate::config::EtlConfig;
use crate::db::{Database, DbErrorKind};
use crate::error::{EtlError, EtlResult};
use crate::storage::{remove_scratch_file, S3File};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStrategy {
    #[default]
    BasicUpsert,
    AuditedUpsert,
    AuditedUpsertToPostgres,
}

impl IngestStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStrategy::BasicUpsert => "basic_upsert",
            IngestStrategy::AuditedUpsert => "audited_upsert",
            IngestStrategy::AuditedUpsertToPostgres => "audited_upsert_to_postgres",
        }
    }

    pub fn is_audited(&self) -> bool {
        !matches!(self, IngestStrategy::BasicUpsert)
    }

    /// Loads stream a local file instead of COPYing from object storage
    pub fn is_local(&self) -> bool {
        matches!(self, IngestStrategy::AuditedUpsertToPostgres)
    }
}

impl fmt::Display for IngestStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic_upsert" | "basic" => Ok(IngestStrategy::BasicUpsert),
            "audited_upsert" | "audited" => Ok(IngestStrategy::AuditedUpsert),
            "audited_upsert_to_postgres" | "postgres" => Ok(IngestStrategy::AuditedUpsertToPostgres),
            _ => Err(format!("Unknown ingest strategy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    Created,
    BeforeIngest,
    Ingesting,
    AfterIngest,
    Cleanup,
    Done,
    Failed,
}

impl IngestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestState::Created => "created",
            IngestState::BeforeIngest => "before_ingest",
            IngestState::Ingesting => "ingesting",
            IngestState::AfterIngest => "after_ingest",
            IngestState::Cleanup => "cleanup",
            IngestState::Done => "done",
            IngestState::Failed => "failed",
        }
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the rows of a job come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Object-storage location the warehouse COPYs from
    Object(String),
    /// Local file streamed over the database connection
    LocalFile(PathBuf),
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadSource::Object(location) => f.write_str(location),
            LoadSource::LocalFile(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Outcome of a finished job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub strategy: IngestStrategy,
    pub source: String,
    pub target_table: String,
    pub staging_table: String,
    pub audit_id: Option<String>,
    pub load_query_id: Option<i32>,
    /// Audit detail JSON, for audited strategies
    pub detail: Option<String>,
}

/// Extra work after a load, e.g. notifications
///
/// Hooks run in order once the audit detail is written. A failing hook
/// fails the job; the merge is already committed by then.
#[async_trait]
pub trait PostLoadHook: Send + Sync {
    fn name(&self) -> &str;

    async fn after_load(&self, report: &LoadReport) -> EtlResult<()>;
}

pub struct Ingestor {
    strategy: IngestStrategy,
    source: LoadSource,
    destination: RedshiftTable,
    options: IngestOptions,
    connection_string: String,
    audit_table: String,
    hooks: Vec<Arc<dyn PostLoadHook>>,
    vacuum: bool,
    /// Downloaded copy of the source, removed once the job finishes
    scratch_file: Option<PathBuf>,
    state: IngestState,
    audit: Option<AuditRecord>,
    load_query_id: Option<i32>,
    detail: Option<String>,
}

impl fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor")
            .field("strategy", &self.strategy)
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("options", &self.options)
            .field("state", &self.state)
            .finish()
    }
}

impl Ingestor {
    /// Build a job for `source`, using the destination database's strategy
    pub fn new(
        source: LoadSource,
        destination: RedshiftTable,
        options: IngestOptions,
        connection_string: impl Into<String>,
        config: &EtlConfig,
    ) -> EtlResult<Self> {
        let strategy = destination.database().ingest_strategy();

        if strategy.is_local() && options.with_manifest {
            return Err(EtlError::postgres_manifest());
        }

        match (&source, strategy.is_local()) {
            (LoadSource::Object(_), true) => {
                return Err(EtlError::Unsupported(format!(
                    "{} loads from a local file; download the object first",
                    strategy
                )));
            },
            (LoadSource::LocalFile(_), false) => {
                return Err(EtlError::Unsupported(format!(
                    "{} loads from object storage, not a local file",
                    strategy
                )));
            },
            _ => {},
        }

        Ok(Self {
            strategy,
            source,
            destination,
            options,
            connection_string: connection_string.into(),
            audit_table: config.audit_table.clone(),
            hooks: Vec::new(),
            vacuum: true,
            scratch_file: None,
            state: IngestState::Created,
            audit: None,
            load_query_id: None,
            detail: None,
        })
    }

    /// Build a job for an object, downloading it first when the strategy
    /// loads from local files
    pub async fn prepare(
        file: &S3File,
        destination: RedshiftTable,
        options: IngestOptions,
        identity: &Identity,
        config: &EtlConfig,
    ) -> EtlResult<Self> {
        let strategy = destination.database().ingest_strategy();

        let source = if strategy.is_local() {
            if options.with_manifest {
                return Err(EtlError::postgres_manifest());
            }
            LoadSource::LocalFile(file.download_to_temp(config.local_temp_dir()).await?)
        } else {
            LoadSource::Object(file.path().to_string())
        };

        let scratch_file = match source {
            LoadSource::LocalFile(ref path) => Some(path.clone()),
            LoadSource::Object(_) => None,
        };

        match Self::new(source, destination, options, identity.connection_string(), config) {
            Ok(mut ingestor) => {
                ingestor.scratch_file = scratch_file;
                Ok(ingestor)
            },
            Err(e) => {
                if let Some(ref path) = scratch_file {
                    remove_scratch_file(path).await;
                }
                Err(e)
            },
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostLoadHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_hooks(mut self, hooks: impl IntoIterator<Item = Arc<dyn PostLoadHook>>) -> Self {
        self.hooks.extend(hooks);
        self
    }

    /// Skip the post-load VACUUM of audited strategies
    pub fn without_vacuum(mut self) -> Self {
        self.vacuum = false;
        self
    }

    pub fn strategy(&self) -> IngestStrategy {
        self.strategy
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn source(&self) -> &LoadSource {
        &self.source
    }

    pub fn destination(&self) -> &RedshiftTable {
        &self.destination
    }

    pub fn audit_id(&self) -> Option<&str> {
        self.audit.as_ref().map(|audit| audit.uuid.as_str())
    }

    pub fn load_query_id(&self) -> Option<i32> {
        self.load_query_id
    }

    /// Statements the ingest phase will run
    pub fn statements(&self) -> UpsertStatements {
        match self.source {
            LoadSource::Object(ref location) => UpsertStatements::from_object(
                &self.destination,
                location,
                &self.connection_string,
                &self.options,
            ),
            LoadSource::LocalFile(_) => UpsertStatements::from_stdin(&self.destination, &self.options),
        }
    }

    /// Run every phase once
    #[instrument(
        skip(self),
        fields(
            target_table = %self.destination.target_table(),
            staging_table = %self.destination.staging_table_name(),
            strategy = %self.strategy,
        )
    )]
    pub async fn run(&mut self) -> EtlResult<LoadReport> {
        if self.state != IngestState::Created {
            return Err(EtlError::Unsupported(format!(
                "ingestion into {} already ran (state: {})",
                self.destination.target_table(),
                self.state
            )));
        }

        let outcome = self.run_phases().await;
        if let Some(path) = self.scratch_file.take() {
            remove_scratch_file(&path).await;
        }

        match outcome {
            Ok(report) => {
                self.state = IngestState::Done;
                info!(audit_id = ?report.audit_id, "Load complete from {}", self.source);
                Ok(report)
            },
            Err(e) => {
                error!(state = %self.state, error = %e, "Load failed");
                self.state = IngestState::Failed;
                Err(e)
            },
        }
    }

    async fn run_phases(&mut self) -> EtlResult<LoadReport> {
        self.before_ingest().await?;
        self.ingest().await?;
        let report = self.after_ingest().await?;
        self.cleanup().await?;
        Ok(report)
    }

    fn database(&self) -> Arc<dyn Database> {
        Arc::clone(self.destination.database())
    }

    async fn before_ingest(&mut self) -> EtlResult<()> {
        self.state = IngestState::BeforeIngest;
        if !self.strategy.is_audited() {
            return Ok(());
        }

        let record = AuditRecord::new(&self.destination);
        self.database()
            .execute_with(&insert_audit_sql(&self.audit_table), &record.insert_params())
            .await?;

        debug!(audit_id = %record.uuid, audit_table = %self.audit_table, "Audit row written");
        self.audit = Some(record);
        Ok(())
    }

    async fn ingest(&mut self) -> EtlResult<()> {
        self.state = IngestState::Ingesting;
        let database = self.database();
        let statements = self.statements();

        match (&self.source, self.strategy) {
            (LoadSource::Object(_), IngestStrategy::BasicUpsert) => {
                database.execute(&statements.to_script()).await?;
            },
            (LoadSource::Object(_), IngestStrategy::AuditedUpsert) => {
                self.load_query_id = database
                    .execute_returning_copy_id(&statements.to_script_with_copy_id())
                    .await?;
                debug!(query_id = ?self.load_query_id, "COPY finished");
            },
            (LoadSource::LocalFile(path), IngestStrategy::AuditedUpsertToPostgres) => {
                let file = tokio::fs::File::open(path).await?;
                debug!("Streaming {} into staging table", path.display());
                database.copy_in_transaction(&statements, file).await?;
            },
            (source, strategy) => {
                return Err(EtlError::Unsupported(format!(
                    "{} cannot load from {}",
                    strategy, source
                )));
            },
        }

        Ok(())
    }

    async fn after_ingest(&mut self) -> EtlResult<LoadReport> {
        self.state = IngestState::AfterIngest;
        let database = self.database();

        if let Some(ref audit) = self.audit {
            let detail = match (self.strategy, self.load_query_id) {
                (IngestStrategy::AuditedUpsert, Some(query_id)) => {
                    let result = database.fetch_load_result(LOAD_RESULT_QUERY, query_id).await?;
                    load_detail(result.as_ref())?
                },
                _ => EMPTY_DETAIL.to_string(),
            };

            database
                .execute_with(&update_detail_sql(&self.audit_table), &audit.update_params(&detail))
                .await?;

            debug!(audit_id = %audit.uuid, "Audit detail written");
            self.detail = Some(detail);
        }

        let report = self.report();
        for hook in &self.hooks {
            debug!(hook = hook.name(), "Running post-load hook");
            hook.after_load(&report).await?;
        }

        Ok(report)
    }

    async fn cleanup(&mut self) -> EtlResult<()> {
        self.state = IngestState::Cleanup;
        if !(self.vacuum && self.strategy.is_audited()) {
            return Ok(());
        }

        let statement = format!("VACUUM {};", self.destination.target_table());
        match self.database().execute(&statement).await {
            Ok(()) => {
                debug!("Vacuumed {}", self.destination.target_table());
                Ok(())
            },
            Err(e) if e.kind() == DbErrorKind::ConcurrentMaintenance => {
                warn!(error = %e, "VACUUM already running on another session, skipping");
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }

    fn report(&self) -> LoadReport {
        LoadReport {
            strategy: self.strategy,
            source: self.source.to_string(),
            target_table: self.destination.target_table().to_string(),
            staging_table: self.destination.staging_table_name().to_string(),
            audit_id: self.audit_id().map(str::to_string),
            load_query_id: self.load_query_id,
            detail: self.detail.clone(),
        }
    }
}
