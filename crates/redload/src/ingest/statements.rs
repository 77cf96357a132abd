//! Staging/merge SQL composition

use super::RedshiftTable;

/// COPY options that are always present, in order.
pub const BASE_COPY_PARAMETERS: [&str; 4] =
    ["EMPTYASNULL", "BLANKSASNULL", "TIMEFORMAT AS 'auto'", "STATUPDATE ON"];

/// Trailing query that returns the id of the last COPY in the session.
pub const LAST_COPY_ID_QUERY: &str = "SELECT PG_LAST_COPY_ID();";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Source is a manifest listing the objects to load
    pub with_manifest: bool,
    /// JSONPaths location; without it the source is read as CSV
    pub jsonpaths: Option<String>,
    pub gzip: bool,
    pub max_errors: Option<u32>,
    /// Insert only distinct staged rows
    pub dedupe: bool,
}

impl IngestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manifest(mut self) -> Self {
        self.with_manifest = true;
        self
    }

    pub fn with_jsonpaths(mut self, jsonpaths: impl Into<String>) -> Self {
        self.jsonpaths = Some(jsonpaths.into());
        self
    }

    pub fn with_gzip(mut self) -> Self {
        self.gzip = true;
        self
    }

    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = Some(max_errors);
        self
    }

    pub fn with_dedupe(mut self) -> Self {
        self.dedupe = true;
        self
    }

    pub fn copy_parameters(&self) -> Vec<String> {
        let mut parameters: Vec<String> = BASE_COPY_PARAMETERS.iter().map(|p| p.to_string()).collect();

        if self.with_manifest {
            parameters.push("MANIFEST".to_string());
        }
        if self.gzip {
            parameters.push("GZIP".to_string());
        }
        if let Some(max_errors) = self.max_errors {
            parameters.push(format!("MAXERROR {}", max_errors));
        }

        match self.jsonpaths {
            Some(ref jsonpaths) => parameters.push(format!("JSON '{}'", jsonpaths)),
            None => {
                parameters.push("CSV".to_string());
                parameters.push("IGNOREBLANKLINES".to_string());
            },
        }

        parameters
    }
}

/// The statements of one staged upsert, without terminators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertStatements {
    pub create_staging: String,
    pub copy: String,
    pub delete: String,
    pub insert: String,
    pub drop_staging: String,
}

impl UpsertStatements {
    /// Warehouse COPY from an object-storage location
    pub fn from_object(
        destination: &RedshiftTable,
        source_location: &str,
        connection_string: &str,
        options: &IngestOptions,
    ) -> Self {
        let copy = format!(
            "COPY {} FROM '{}' WITH CREDENTIALS '{}' {}",
            destination.staging_table_name(),
            source_location,
            connection_string,
            options.copy_parameters().join(" ")
        );
        Self::with_copy(destination, copy, options)
    }

    /// Plain COPY fed over the client connection
    pub fn from_stdin(destination: &RedshiftTable, options: &IngestOptions) -> Self {
        let copy = format!("COPY {} FROM STDIN CSV", destination.staging_table_name());
        Self::with_copy(destination, copy, options)
    }

    fn with_copy(destination: &RedshiftTable, copy: String, options: &IngestOptions) -> Self {
        let target = destination.target_table();
        let staging = destination.staging_table_name();

        let matches = destination
            .upsert_key()
            .iter()
            .map(|column| format!("{target}.{column} = {staging}.{column}"))
            .collect::<Vec<_>>()
            .join(" AND ");

        let select = if options.dedupe { "SELECT DISTINCT" } else { "SELECT" };

        Self {
            create_staging: format!("CREATE TEMP TABLE {} (LIKE {})", staging, target),
            copy,
            delete: format!("DELETE FROM {} USING {} WHERE ({})", target, staging, matches),
            insert: format!("INSERT INTO {} {} * FROM {}", target, select, staging),
            drop_staging: format!("DROP TABLE {}", staging),
        }
    }

    /// Everything after the COPY
    pub fn merge_script(&self) -> String {
        format!("{};\n{};\n{};", self.delete, self.insert, self.drop_staging)
    }

    /// The full transaction as one script
    pub fn to_script(&self) -> String {
        format!(
            "BEGIN TRANSACTION;\n{};\n{};\n{}\nEND TRANSACTION;",
            self.create_staging,
            self.copy,
            self.merge_script()
        )
    }

    /// Script that also reports the COPY's query id
    pub fn to_script_with_copy_id(&self) -> String {
        format!("{}\n{}", self.to_script(), LAST_COPY_ID_QUERY)
    }
}
