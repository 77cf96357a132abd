//! Source normalization
//!
//! Every entry point turns its input into one stored object and hands that
//! object to [`s3_to_redshift`]. Entry points that stage data themselves
//! check for `REDLOAD_S3_BASE_PATH` before doing anything else.
//!
//! Staged objects land at
//! `<base>/<database name>/<schema>/<staging table name>{.csv,.manifest}`;
//! local scratch files at `<local temp dir>/<staging table name>.csv`, removed
//! once the load finishes.

use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{IngestOptions, Ingestor, LoadManifest, LoadReport, PostLoadHook, RedshiftTable};
use crate::aws::{CredentialOverrides, CredentialResolver, Identity};
use crate::config::EtlConfig;
use crate::db::PgDatabase;
use crate::error::{EtlError, EtlResult};
use crate::storage::{join_path, remove_scratch_file, ObjectStorage, S3File, S3Path, S3Storage};

/// What every entry point needs besides its input
#[derive(Clone)]
pub struct IngestContext {
    config: EtlConfig,
    identity: Identity,
    storage: Arc<dyn ObjectStorage>,
    hooks: Vec<Arc<dyn PostLoadHook>>,
    vacuum: bool,
}

impl IngestContext {
    pub fn new(config: EtlConfig, identity: Identity, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            config,
            identity,
            storage,
            hooks: Vec::new(),
            vacuum: true,
        }
    }

    /// Resolve credentials and talk to S3 with them
    pub async fn connect(config: EtlConfig, overrides: &CredentialOverrides) -> EtlResult<Self> {
        let identity = CredentialResolver::new(&config).resolve(overrides).await?;
        let storage = S3Storage::new(&identity, config.s3_endpoint.as_deref());
        Ok(Self::new(config, identity, Arc::new(storage)))
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostLoadHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn without_vacuum(mut self) -> Self {
        self.vacuum = false;
        self
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn storage(&self) -> Arc<dyn ObjectStorage> {
        Arc::clone(&self.storage)
    }
}

/// Load an existing object
#[instrument(skip_all, fields(source = %file.path(), target_table = %destination.target_table()))]
pub async fn s3_to_redshift(
    context: &IngestContext,
    file: &S3File,
    destination: RedshiftTable,
    options: IngestOptions,
) -> EtlResult<LoadReport> {
    let mut ingestor = Ingestor::prepare(file, destination, options, &context.identity, &context.config)
        .await?
        .with_hooks(context.hooks.iter().cloned());

    if !context.vacuum {
        ingestor = ingestor.without_vacuum();
    }

    ingestor.run().await
}

pub async fn from_s3_file(
    context: &IngestContext,
    file: &S3File,
    destination: RedshiftTable,
    options: IngestOptions,
) -> EtlResult<LoadReport> {
    s3_to_redshift(context, file, destination, options).await
}

/// Load a CSV object; relative paths resolve against the base path
pub async fn from_s3_path(
    context: &IngestContext,
    path: &str,
    destination: RedshiftTable,
    options: IngestOptions,
) -> EtlResult<LoadReport> {
    let path = S3Path::resolve(path, &context.config)?;
    let file = S3File::new(path, context.storage());
    from_s3_file(context, &file, destination, options).await
}

/// Upload a local CSV file, then load it
pub async fn from_local_file(
    context: &IngestContext,
    local_path: &Path,
    destination: RedshiftTable,
    options: IngestOptions,
) -> EtlResult<LoadReport> {
    let object_path = transient_s3_path(&context.config, &destination, ".csv")?;
    let file = S3File::from_local_file(context.storage(), local_path, object_path).await?;
    from_s3_file(context, &file, destination, options).await
}

/// Write rows as CSV, then load them
pub async fn from_in_memory<R, V>(
    context: &IngestContext,
    rows: impl IntoIterator<Item = R>,
    destination: RedshiftTable,
    options: IngestOptions,
) -> EtlResult<LoadReport>
where
    R: IntoIterator<Item = V>,
    V: Display,
{
    context.config.require_s3_base_path()?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.write_record(row.into_iter().map(|value| value.to_string()))?;
    }
    let data = writer.into_inner().map_err(|e| EtlError::Io(e.into_error()))?;

    load_transient_local(context, &data, destination, options).await
}

/// Write serializable records as headerless CSV, then load them
pub async fn from_records<T: Serialize>(
    context: &IngestContext,
    records: &[T],
    destination: RedshiftTable,
    options: IngestOptions,
) -> EtlResult<LoadReport> {
    context.config.require_s3_base_path()?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let data = writer.into_inner().map_err(|e| EtlError::Io(e.into_error()))?;

    load_transient_local(context, &data, destination, options).await
}

/// Copy a query result out of another Postgres, then load it
pub async fn from_postgres_query(
    context: &IngestContext,
    source: &PgDatabase,
    query: &str,
    destination: RedshiftTable,
    options: IngestOptions,
) -> EtlResult<LoadReport> {
    context.config.require_s3_base_path()?;

    let data = source.copy_query_to_csv(query).await?;
    load_transient_local(context, &data, destination, options).await
}

/// Upload a manifest and load the objects it lists
pub async fn from_manifest(
    context: &IngestContext,
    manifest: &LoadManifest,
    destination: RedshiftTable,
    options: IngestOptions,
) -> EtlResult<LoadReport> {
    context.config.require_s3_base_path()?;

    if destination.database().ingest_strategy().is_local() {
        return Err(EtlError::postgres_manifest());
    }

    let object_path = transient_s3_path(&context.config, &destination, ".manifest")?;
    let file = S3File::from_json_serializable(context.storage(), manifest, object_path).await?;

    info!(entries = manifest.len(), "Uploaded manifest {}", file.path());
    s3_to_redshift(context, &file, destination, options.with_manifest()).await
}

/// Object path a staged upload for `destination` goes to
pub fn transient_s3_path(config: &EtlConfig, destination: &RedshiftTable, extension: &str) -> EtlResult<S3Path> {
    let base = config.require_s3_base_path()?;
    let sub_path = format!(
        "{}/{}/{}{}",
        destination.database().name(),
        destination.schema_name(),
        destination.staging_table_name(),
        extension
    );
    Ok(S3Path::parse(&join_path(base, &sub_path))?)
}

/// Scratch file a local staging write for `destination` goes to
pub fn transient_local_path(config: &EtlConfig, destination: &RedshiftTable) -> PathBuf {
    config
        .local_temp_dir()
        .join(format!("{}.csv", destination.staging_table_name()))
}

/// Write `data` to the scratch file, load it, then remove the scratch file
async fn load_transient_local(
    context: &IngestContext,
    data: &[u8],
    destination: RedshiftTable,
    options: IngestOptions,
) -> EtlResult<LoadReport> {
    let local_path = write_transient_local(&context.config, &destination, data).await?;
    let outcome = from_local_file(context, &local_path, destination, options).await;
    remove_scratch_file(&local_path).await;
    outcome
}

async fn write_transient_local(
    config: &EtlConfig,
    destination: &RedshiftTable,
    data: &[u8],
) -> EtlResult<PathBuf> {
    tokio::fs::create_dir_all(config.local_temp_dir()).await?;

    let path = transient_local_path(config, destination);
    tokio::fs::write(&path, data).await?;

    debug!(path = %path.display(), bytes = data.len(), "Wrote staging file");
    Ok(path)
}
