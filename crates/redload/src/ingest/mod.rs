//! Staged bulk-load-then-merge ingestion
//!
//! A load goes through a staging table: COPY into a temp table shaped like
//! the target, delete target rows matching the staged rows on every upsert
//! key column, insert the staged rows, drop the staging table. All of it
//! runs in one transaction.
//!
//! ```no_run
//! use std::sync::Arc;
//! use redload::config::EtlConfig;
//! use redload::db::{DbConfig, PgDatabase};
//! use redload::ingest::{self, IngestContext, IngestOptions, IngestStrategy, RedshiftTable};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EtlConfig::load()?;
//! let database = PgDatabase::connect(&DbConfig::from_env()?)
//!     .await?
//!     .with_strategy(IngestStrategy::AuditedUpsert);
//! let context = IngestContext::connect(config, &Default::default()).await?;
//!
//! let destination = RedshiftTable::new(Arc::new(database), "public.channels", ["id"])?;
//! let rows = vec![vec!["5", "funzies"], vec!["7", "sadzies"]];
//! let report = ingest::from_in_memory(&context, rows, destination, IngestOptions::new()).await?;
//! println!("{:?}", report.audit_id);
//! # Ok(())
//! # }
//! ```

pub mod audit;
mod destination;
mod ingestor;
mod manifest;
pub mod sources;
mod statements;

pub use audit::{AuditRecord, LoadResult};
pub use destination::{RedshiftTable, STAGING_TIMESTAMP_FORMAT};
pub use ingestor::{
    IngestState, IngestStrategy, Ingestor, LoadReport, LoadSource, PostLoadHook,
};
pub use manifest::{LoadManifest, ManifestEntry};
pub use sources::{
    from_in_memory, from_local_file, from_manifest, from_postgres_query, from_records,
    from_s3_file, from_s3_path, s3_to_redshift, IngestContext,
};
pub use statements::{IngestOptions, UpsertStatements, BASE_COPY_PARAMETERS, LAST_COPY_ID_QUERY};
