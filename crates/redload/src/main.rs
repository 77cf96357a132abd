//! Redload - staged bulk loads into Redshift

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use redload::aws::{CredentialOverrides, CredentialResolver};
use redload::config::EtlConfig;
use redload::db::{self, DbConfig, PgDatabase, UnloadCompression, UnloadOptions};
use redload::ingest::{self, IngestContext, IngestOptions, IngestStrategy, LoadReport, RedshiftTable};
use redload_common::logging::{init_logging, LogConfig, LogLevel};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "redload")]
#[command(author, version, about = "Staged bulk loads into Redshift")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Warehouse connection URL
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage a local CSV file and merge it into a table
    LoadFile {
        /// Local CSV file
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Merge an object already in S3 into a table
    LoadS3 {
        /// s3:// path, or a path relative to REDLOAD_S3_BASE_PATH
        #[arg(short, long)]
        path: String,

        /// The object is a COPY manifest
        #[arg(long)]
        manifest: bool,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// UNLOAD a query result to S3
    Unload {
        #[arg(short, long)]
        query: String,

        /// Destination s3:// prefix
        #[arg(short, long)]
        path: String,

        /// Write one file per slice plus a manifest
        #[arg(long)]
        parallel: bool,

        #[arg(long)]
        allow_overwrite: bool,

        #[arg(long, default_value_t = '|')]
        delimiter: char,

        #[arg(long)]
        add_quotes: bool,

        #[arg(long)]
        escape: bool,

        #[arg(long)]
        header: bool,

        /// gzip, bzip2 or zstd
        #[arg(long)]
        compression: Option<UnloadCompression>,

        /// e.g. "100 MB"
        #[arg(long)]
        max_file_size: Option<String>,
    },

    /// Resolve credentials and report which tier supplied them
    Credentials,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Engine {
    Redshift,
    /// Local Postgres standing in for Redshift
    Postgres,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Target table as schema.table
    #[arg(short, long)]
    table: String,

    /// Upsert key column; repeat for composite keys
    #[arg(short, long = "key", required = true)]
    keys: Vec<String>,

    #[arg(long, value_enum, default_value_t = Engine::Redshift)]
    engine: Engine,

    /// Record each load in the audit table
    #[arg(long)]
    audited: bool,

    #[arg(long)]
    gzip: bool,

    /// JSONPaths file; without it the input is CSV
    #[arg(long)]
    jsonpaths: Option<String>,

    #[arg(long)]
    max_errors: Option<u32>,

    /// Insert only distinct staged rows
    #[arg(long)]
    dedupe: bool,

    /// Skip the post-load VACUUM
    #[arg(long)]
    no_vacuum: bool,
}

impl TargetArgs {
    fn strategy(&self) -> IngestStrategy {
        match (self.engine, self.audited) {
            (Engine::Postgres, _) => IngestStrategy::AuditedUpsertToPostgres,
            (Engine::Redshift, true) => IngestStrategy::AuditedUpsert,
            (Engine::Redshift, false) => IngestStrategy::BasicUpsert,
        }
    }

    fn options(&self) -> IngestOptions {
        IngestOptions {
            with_manifest: false,
            jsonpaths: self.jsonpaths.clone(),
            gzip: self.gzip,
            max_errors: self.max_errors,
            dedupe: self.dedupe,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("redload")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = EtlConfig::load()?;

    match cli.command {
        Command::LoadFile { file, target } => {
            let (context, destination) = prepare(&cli.database_url, config, &target).await?;
            let report = ingest::from_local_file(&context, &file, destination, target.options()).await?;
            print_report(&report)?;
        },
        Command::LoadS3 { path, manifest, target } => {
            let (context, destination) = prepare(&cli.database_url, config, &target).await?;
            let mut options = target.options();
            options.with_manifest = manifest;
            let report = ingest::from_s3_path(&context, &path, destination, options).await?;
            print_report(&report)?;
        },
        Command::Unload {
            query,
            path,
            parallel,
            allow_overwrite,
            delimiter,
            add_quotes,
            escape,
            header,
            compression,
            max_file_size,
        } => {
            let identity = CredentialResolver::new(&config)
                .resolve(&CredentialOverrides::default())
                .await?;
            let database = connect(&cli.database_url).await?;

            let options = UnloadOptions {
                parallel,
                allow_overwrite,
                delimiter,
                add_quotes,
                escape,
                header,
                compression,
                max_file_size,
            };
            db::unload(&database, &query, &path, &options, &identity).await?;
        },
        Command::Credentials => {
            let identity = CredentialResolver::new(&config)
                .resolve(&CredentialOverrides::default())
                .await?;
            println!("{:?} credentials, region {}", identity.provenance(), identity.region().unwrap_or("unset"));
        },
    }

    info!("Done");
    Ok(())
}

async fn connect(database_url: &Option<String>) -> Result<PgDatabase> {
    let url = database_url
        .clone()
        .context("DATABASE_URL or --database-url is required")?;
    let database = PgDatabase::connect(&DbConfig::from_env_with_url(url)?).await?;
    Ok(database)
}

async fn prepare(
    database_url: &Option<String>,
    config: EtlConfig,
    target: &TargetArgs,
) -> Result<(IngestContext, RedshiftTable)> {
    let database = connect(database_url).await?.with_strategy(target.strategy());
    let database = match target.engine {
        Engine::Postgres => database.with_name("postgres"),
        Engine::Redshift => database,
    };

    let mut context = IngestContext::connect(config, &CredentialOverrides::default()).await?;
    if target.no_vacuum {
        context = context.without_vacuum();
    }

    let destination = RedshiftTable::new(Arc::new(database), &target.table, target.keys.iter().cloned())?;
    Ok((context, destination))
}

fn print_report(report: &LoadReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
