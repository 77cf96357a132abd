//! UNLOAD statement composition
//!
//! Without `parallel` the warehouse writes a single file (`PARALLEL OFF`).
//! With it, output is split across slices and a manifest is written next to
//! the data, which is what you want when loading the result back into
//! another cluster.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, instrument};

use super::{Database, DbResult};
use crate::aws::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnloadCompression {
    Gzip,
    Bzip2,
    Zstd,
}

impl UnloadCompression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "GZIP",
            Self::Bzip2 => "BZIP2",
            Self::Zstd => "ZSTD",
        }
    }
}

impl fmt::Display for UnloadCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnloadCompression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GZIP" => Ok(Self::Gzip),
            "BZIP2" => Ok(Self::Bzip2),
            "ZSTD" => Ok(Self::Zstd),
            _ => Err(format!("Invalid compression type: {}. Use gzip, bzip2 or zstd", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadOptions {
    pub parallel: bool,
    pub allow_overwrite: bool,
    pub delimiter: char,
    pub add_quotes: bool,
    pub escape: bool,
    pub header: bool,
    pub compression: Option<UnloadCompression>,
    /// e.g. `100 MB`
    pub max_file_size: Option<String>,
}

impl Default for UnloadOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            allow_overwrite: false,
            delimiter: '|',
            add_quotes: false,
            escape: false,
            header: false,
            compression: None,
            max_file_size: None,
        }
    }
}

impl UnloadOptions {
    /// Options clause in the order the warehouse documents them
    pub fn to_clause(&self) -> String {
        let mut commands = vec![if self.parallel { "MANIFEST".to_string() } else { "PARALLEL OFF".to_string() }];

        if self.allow_overwrite {
            commands.push("ALLOWOVERWRITE".to_string());
        }
        commands.push(format!("DELIMITER '{}'", self.delimiter));
        if self.add_quotes {
            commands.push("ADDQUOTES".to_string());
        }
        if self.escape {
            commands.push("ESCAPE".to_string());
        }
        if self.header {
            commands.push("HEADER".to_string());
        }
        if let Some(compression) = self.compression {
            commands.push(compression.as_str().to_string());
        }
        if let Some(ref size) = self.max_file_size {
            commands.push(format!("MAXFILESIZE {}", size));
        }

        commands.join(" ")
    }
}

pub fn compose_unload_query(
    query: &str,
    s3_path: &str,
    connection_string: &str,
    options: &UnloadOptions,
) -> String {
    format!(
        "UNLOAD ('{}') TO '{}' CREDENTIALS '{}' {};",
        query.replace('\'', "\\'"),
        s3_path,
        connection_string,
        options.to_clause()
    )
}

#[instrument(skip(database, query, identity), fields(database = database.name()))]
pub async fn unload(
    database: &dyn Database,
    query: &str,
    s3_path: &str,
    options: &UnloadOptions,
    identity: &Identity,
) -> DbResult<()> {
    let statement = compose_unload_query(query, s3_path, &identity.connection_string(), options);
    database.execute(&statement).await?;

    info!("Unloaded query to {}", s3_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "SELECT * FROM funzies";
    const PATH: &str = "s3://ye-bucket/unloads/funzies";
    const CREDS: &str = "faux_aws_credentials";

    fn compose(options: &UnloadOptions) -> String {
        compose_unload_query(QUERY, PATH, CREDS, options)
    }

    #[test]
    fn test_default_unload_is_single_file() {
        assert_eq!(
            compose(&UnloadOptions::default()),
            "UNLOAD ('SELECT * FROM funzies') TO 's3://ye-bucket/unloads/funzies' \
             CREDENTIALS 'faux_aws_credentials' PARALLEL OFF DELIMITER '|';"
        );
    }

    #[test]
    fn test_parallel_unload_writes_manifest() {
        let options = UnloadOptions {
            parallel: true,
            ..Default::default()
        };
        assert_eq!(
            compose(&options),
            "UNLOAD ('SELECT * FROM funzies') TO 's3://ye-bucket/unloads/funzies' \
             CREDENTIALS 'faux_aws_credentials' MANIFEST DELIMITER '|';"
        );
    }

    #[test]
    fn test_option_order() {
        let options = UnloadOptions {
            parallel: true,
            allow_overwrite: true,
            delimiter: ',',
            add_quotes: true,
            escape: true,
            header: true,
            compression: Some(UnloadCompression::Gzip),
            max_file_size: Some("100 MB".to_string()),
        };
        assert_eq!(
            options.to_clause(),
            "MANIFEST ALLOWOVERWRITE DELIMITER ',' ADDQUOTES ESCAPE HEADER GZIP MAXFILESIZE 100 MB"
        );
    }

    #[test]
    fn test_option_subsets_keep_relative_order() {
        let options = UnloadOptions {
            allow_overwrite: true,
            escape: true,
            ..Default::default()
        };
        assert_eq!(options.to_clause(), "PARALLEL OFF ALLOWOVERWRITE DELIMITER '|' ESCAPE");

        let options = UnloadOptions {
            add_quotes: true,
            delimiter: '\t',
            ..Default::default()
        };
        assert_eq!(options.to_clause(), "PARALLEL OFF DELIMITER '\t' ADDQUOTES");
    }

    #[test]
    fn test_quotes_in_query_are_escaped() {
        let statement = compose_unload_query(
            "SELECT * FROM events WHERE ts < '2014-01-01'",
            PATH,
            CREDS,
            &UnloadOptions::default(),
        );
        assert!(statement.starts_with("UNLOAD ('SELECT * FROM events WHERE ts < \\'2014-01-01\\'')"));
    }

    #[test]
    fn test_compression_parsing() {
        assert_eq!("bzip2".parse::<UnloadCompression>().unwrap(), UnloadCompression::Bzip2);
        assert!("lzop".parse::<UnloadCompression>().is_err());
    }
}
