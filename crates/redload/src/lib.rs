//! Redload
//!
//! Staged bulk loads into Redshift: resolve AWS credentials, stage data in
//! S3, COPY it into a temporary table and merge it into the target keyed
//! on the upsert columns, optionally recording an audit trail per load.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod aws;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod storage;

pub use config::EtlConfig;
pub use error::{EtlError, EtlResult};
