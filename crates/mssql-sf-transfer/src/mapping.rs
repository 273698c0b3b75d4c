//! Static table-to-table mapping types.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};

/// How rows are written into the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Insert new rows; never deduplicates. Re-running a successful transfer
    /// appends the rows again.
    #[default]
    Append,

    /// Merge on key columns. Accepted by the parser but not implemented;
    /// validation rejects it with an explicit message.
    Upsert,
}

/// One column-level correspondence inside a table mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Source column name.
    pub source: String,

    /// Target column name.
    pub target: String,

    /// Optional target type hint (e.g. "NUMBER(10,2)", "TIMESTAMP_NTZ").
    /// When absent, the type is derived from the source column's type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
}

/// A declared source-table-to-target-table correspondence.
///
/// Loaded once per run from configuration and never mutated. Column
/// existence is validated lazily against the source on first read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMapping {
    /// Source table, `DATABASE.SCHEMA.TABLE` or `SCHEMA.TABLE`.
    pub source: String,

    /// Target table, `TABLE` or `DATABASE.SCHEMA.TABLE`. Unqualified names
    /// resolve against the target config's database and schema.
    pub target: String,

    /// Ordered column map. Order is preserved end to end.
    pub columns: Vec<ColumnMapping>,

    /// Load mode (default: append).
    #[serde(default)]
    pub mode: LoadMode,
}

/// A parsed three-part source table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTableParts {
    /// Database name, when the mapping is fully qualified.
    pub database: Option<String>,
    pub schema: String,
    pub table: String,
}

impl TableMapping {
    /// Split the source name into database/schema/table parts.
    ///
    /// Accepts `DB.SCHEMA.TABLE` and `SCHEMA.TABLE`; a bare table name gets
    /// the conventional `dbo` schema.
    pub fn source_parts(&self) -> Result<SourceTableParts> {
        let parts: Vec<&str> = self.source.split('.').collect();
        match parts.as_slice() {
            [db, schema, table] => Ok(SourceTableParts {
                database: Some((*db).to_string()),
                schema: (*schema).to_string(),
                table: (*table).to_string(),
            }),
            [schema, table] => Ok(SourceTableParts {
                database: None,
                schema: (*schema).to_string(),
                table: (*table).to_string(),
            }),
            [table] if !table.is_empty() => Ok(SourceTableParts {
                database: None,
                schema: "dbo".to_string(),
                table: (*table).to_string(),
            }),
            _ => Err(TransferError::Config(format!(
                "invalid source table name '{}' (expected DB.SCHEMA.TABLE or SCHEMA.TABLE)",
                self.source
            ))),
        }
    }

    /// Target column names in mapping order.
    pub fn target_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.target.clone()).collect()
    }

    /// Source column names in mapping order.
    pub fn source_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.source.clone()).collect()
    }

    /// Short display name for logs and reports.
    pub fn display(&self) -> String {
        format!("{} -> {}", self.source, self.target)
    }

    /// Structural validation; schema existence is checked lazily on first read.
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(TransferError::Config(
                "mapping source table must be non-empty".into(),
            ));
        }
        if self.target.trim().is_empty() {
            return Err(TransferError::Config(
                "mapping target table must be non-empty".into(),
            ));
        }
        if self.columns.is_empty() {
            return Err(TransferError::Config(format!(
                "mapping {} declares no columns; the column map is pre-declared, not inferred",
                self.display()
            )));
        }
        for col in &self.columns {
            if col.source.trim().is_empty() || col.target.trim().is_empty() {
                return Err(TransferError::Config(format!(
                    "mapping {} has an empty column name",
                    self.display()
                )));
            }
        }
        if self.mode == LoadMode::Upsert {
            return Err(TransferError::Config(format!(
                "mapping {}: upsert mode is accepted in configuration but not implemented; \
                 use append",
                self.display()
            )));
        }
        self.source_parts()?;
        Ok(())
    }
}
