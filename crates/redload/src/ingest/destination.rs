//! Destination descriptor
//!
//! Names the target table, the columns that identify a logical row, and the
//! staging table an ingestion run loads into before merging.

use chrono::{NaiveDateTime, SubsecRound, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use crate::db::Database;
use crate::error::{EtlError, EtlResult};

/// Timestamp part of staging table names.
pub const STAGING_TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Seconds a registry entry outlives its clock second.
const SALT_RETENTION_SECS: i64 = 300;

/// Names derived so far per (target table, clock second).
fn staging_registry() -> &'static Mutex<HashMap<(String, NaiveDateTime), u32>> {
    static REGISTRY: OnceLock<Mutex<HashMap<(String, NaiveDateTime), u32>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Callers may read the clock before taking the lock, so seconds can
/// arrive out of order; each second keeps its own counter.
fn next_salt(target_table: &str, second: NaiveDateTime) -> u32 {
    let mut registry = staging_registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let horizon = Utc::now().naive_utc() - chrono::Duration::seconds(SALT_RETENTION_SECS);
    registry.retain(|(_, seen), _| *seen >= horizon);

    let count = registry
        .entry((target_table.to_lowercase(), second))
        .or_insert(0);
    let salt = *count;
    *count += 1;
    salt
}

#[derive(Clone)]
pub struct RedshiftTable {
    database: Arc<dyn Database>,
    target_table: String,
    schema_name: String,
    table_name: String,
    upsert_key: Vec<String>,
    created_at: NaiveDateTime,
    staging_table_name: String,
}

impl RedshiftTable {
    /// Describe `target_table` (`schema.table`) as of now
    ///
    /// Two descriptors for the same table created within one second in this
    /// process get distinct staging names: the second and later ones carry
    /// a `_<n>` suffix.
    pub fn new<I, S>(database: Arc<dyn Database>, target_table: &str, upsert_key: I) -> EtlResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let created_at = Utc::now().naive_utc().trunc_subsecs(0);
        let mut table = Self::at(database, target_table, upsert_key, created_at)?;

        let salt = next_salt(&table.target_table, created_at);
        if salt > 0 {
            table.staging_table_name = format!("{}_{}", table.staging_table_name, salt);
        }
        Ok(table)
    }

    /// Describe `target_table` with a fixed creation time; never salted
    pub fn at<I, S>(
        database: Arc<dyn Database>,
        target_table: &str,
        upsert_key: I,
        created_at: NaiveDateTime,
    ) -> EtlResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (schema_name, table_name) = split_target_table(target_table)?;

        let upsert_key: Vec<String> = upsert_key.into_iter().map(Into::into).collect();
        if upsert_key.is_empty() || upsert_key.iter().any(|column| column.trim().is_empty()) {
            return Err(EtlError::invalid_destination(format!(
                "upsert key for {} must name at least one column",
                target_table
            )));
        }

        let staging_table_name = format!(
            "{}_{}",
            table_name,
            created_at.format(STAGING_TIMESTAMP_FORMAT)
        );

        Ok(Self {
            database,
            target_table: target_table.to_string(),
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            upsert_key,
            created_at,
            staging_table_name,
        })
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn upsert_key(&self) -> &[String] {
        &self.upsert_key
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn staging_table_name(&self) -> &str {
        &self.staging_table_name
    }
}

impl fmt::Debug for RedshiftTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedshiftTable")
            .field("database", &self.database.name())
            .field("target_table", &self.target_table)
            .field("upsert_key", &self.upsert_key)
            .field("staging_table_name", &self.staging_table_name)
            .finish()
    }
}

fn split_target_table(target_table: &str) -> EtlResult<(&str, &str)> {
    let mut parts = target_table.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(schema), Some(table), None) if !schema.is_empty() && !table.is_empty() => Ok((schema, table)),
        _ => Err(EtlError::invalid_destination(format!(
            "target table must be schema.table (got '{}')",
            target_table
        ))),
    }
}
