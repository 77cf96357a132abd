//! Redload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient pieces shared by every Redload binary and library.
//!
//! # Overview
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` environment
//!   variables, console and/or daily-rotated file output, text or JSON.
//!
//! # Example
//!
//! ```no_run
//! use redload_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, LogOutput};
