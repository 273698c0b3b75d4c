//! Snowflake target, loaded over ODBC.
//!
//! ODBC has no bulk-load path here, so batches are rendered as multi-row
//! `INSERT ... VALUES` statements with Snowflake SQL literals. Each table
//! loads inside a single transaction by default; `transfer.atomic: false`
//! switches to per-batch commits.

use async_trait::async_trait;
use odbc_api::{Connection, ConnectionOptions, Environment};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::error::{Result, TransferError};
use crate::mapping::TableMapping;
use crate::value::{Record, SqlValue};

/// Rows per INSERT VALUES clause. Larger statements stop helping and start
/// hitting statement-size limits.
const MAX_ROWS_PER_INSERT: usize = 1000;

static ODBC_ENV: OnceLock<Environment> = OnceLock::new();

fn odbc_environment() -> Result<&'static Environment> {
    if let Some(env) = ODBC_ENV.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(|e| {
        TransferError::target_unavailable(
            format!(
                "Failed to create ODBC environment: {}. \
                 Loading into Snowflake requires the Snowflake ODBC driver to be installed.",
                e
            ),
            "ODBC environment",
        )
    })?;
    Ok(ODBC_ENV.get_or_init(|| env))
}

/// An in-progress load for one table.
///
/// `finish` consumes the session and returns the committed row total;
/// `abort` rolls back what the transaction still holds and returns the rows
/// that had already been committed (0 for an atomic session).
#[async_trait]
pub trait LoadSession: Send {
    async fn write_batch(&mut self, records: &[Record]) -> Result<()>;
    async fn finish(self: Box<Self>) -> Result<u64>;
    async fn abort(self: Box<Self>) -> u64;
}

/// Trait for starting per-mapping loads into the target.
#[async_trait]
pub trait TargetLoader: Send + Sync {
    async fn begin_load(&self, mapping: &TableMapping) -> Result<Box<dyn LoadSession>>;
}

/// Snowflake connection handle shared by the loader and the notifier.
pub struct SnowflakePool {
    connection_string: String,
    config: TargetConfig,
}

impl SnowflakePool {
    /// Create the pool and verify connectivity with a probe query.
    pub async fn connect(config: TargetConfig) -> Result<Self> {
        let pool = Self {
            connection_string: config.connection_string(),
            config,
        };

        {
            let conn = pool.get_connection()?;
            conn.execute("SELECT 1", ())
                .map_err(|e| classify_odbc_error("connection probe", e))?;
        }

        info!(
            "Connected to Snowflake: account={} warehouse={} database={}",
            pool.config.account, pool.config.warehouse, pool.config.database
        );
        Ok(pool)
    }

    /// Open a fresh ODBC connection.
    fn get_connection(&self) -> Result<Connection<'static>> {
        odbc_environment()?
            .connect_with_connection_string(&self.connection_string, ConnectionOptions::default())
            .map_err(|e| {
                TransferError::target_unavailable(e.to_string(), "connecting to Snowflake")
            })
    }

    /// Execute a standalone statement on its own connection.
    pub(crate) fn execute(&self, sql: &str) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(sql, ())
            .map_err(|e| classify_odbc_error("execute", e))?;
        Ok(())
    }

    pub(crate) fn config(&self) -> &TargetConfig {
        &self.config
    }
}

/// Snowflake implementation of [`TargetLoader`].
pub struct SnowflakeLoader {
    pool: Arc<SnowflakePool>,
    atomic: bool,
}

impl SnowflakeLoader {
    pub fn new(pool: Arc<SnowflakePool>, atomic: bool) -> Self {
        Self { pool, atomic }
    }
}

#[async_trait]
impl TargetLoader for SnowflakeLoader {
    async fn begin_load(&self, mapping: &TableMapping) -> Result<Box<dyn LoadSession>> {
        let table = self.pool.config().qualify_table(&mapping.target);
        let conn = self.pool.get_connection()?;

        if self.atomic {
            conn.set_autocommit(false)
                .map_err(|e| classify_odbc_error(&table, e))?;
        }

        debug!("Began load session for {} (atomic={})", table, self.atomic);

        Ok(Box::new(SnowflakeLoadSession {
            conn,
            table,
            columns: mapping.target_columns(),
            atomic: self.atomic,
            rows_pending: 0,
            rows_committed: 0,
        }))
    }
}

struct SnowflakeLoadSession {
    conn: Connection<'static>,
    table: String,
    columns: Vec<String>,
    atomic: bool,
    /// Rows written inside the open transaction (atomic mode only).
    rows_pending: u64,
    /// Rows already durable in the target.
    rows_committed: u64,
}

#[async_trait]
impl LoadSession for SnowflakeLoadSession {
    async fn write_batch(&mut self, records: &[Record]) -> Result<()> {
        for chunk in records.chunks(MAX_ROWS_PER_INSERT) {
            let sql = build_insert_sql(&self.table, &self.columns, chunk);
            self.conn
                .execute(&sql, ())
                .map_err(|e| classify_odbc_error(&self.table, e))?;
            if self.atomic {
                self.rows_pending += chunk.len() as u64;
            } else {
                self.rows_committed += chunk.len() as u64;
            }
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<u64> {
        if self.atomic {
            self.conn
                .commit()
                .map_err(|e| classify_odbc_error(&self.table, e))?;
        }
        let total = self.rows_committed + self.rows_pending;
        debug!("Finished load for {}: {} rows", self.table, total);
        Ok(total)
    }

    async fn abort(self: Box<Self>) -> u64 {
        if self.atomic {
            if let Err(e) = self.conn.rollback() {
                warn!("Rollback failed for {}: {}", self.table, e);
            } else {
                debug!(
                    "Rolled back {} pending rows for {}",
                    self.rows_pending, self.table
                );
            }
        }
        self.rows_committed
    }
}

/// Map an ODBC error onto the transfer taxonomy via its SQLSTATE class:
/// 08xxx (connection) and 28xxx (authorization) mean the target is
/// unavailable, anything else is a rejected load.
fn classify_odbc_error(context: &str, err: odbc_api::Error) -> TransferError {
    let state = match &err {
        odbc_api::Error::Diagnostics { record, .. } => {
            String::from_utf8_lossy(&record.state.0).to_string()
        }
        _ => String::new(),
    };
    if state.starts_with("08") || state.starts_with("28") {
        TransferError::target_unavailable(err.to_string(), context.to_string())
    } else {
        TransferError::load_rejected(context.to_string(), err.to_string())
    }
}

/// Render a multi-row INSERT statement for one batch.
fn build_insert_sql(table: &str, columns: &[String], records: &[Record]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let rows = records
        .iter()
        .map(|record| {
            let values = record
                .values()
                .iter()
                .map(sql_value_to_sql_literal)
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", values)
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!("INSERT INTO {} ({}) VALUES\n{}", table, column_list, rows)
}

/// Double-quote a Snowflake identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a Snowflake string literal body. Snowflake treats backslash as an
/// escape character inside single quotes, so both it and the quote need
/// escaping.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Convert SqlValue to a Snowflake SQL literal for INSERT statements.
fn sql_value_to_sql_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null(_) => "NULL".to_string(),
        SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        SqlValue::I16(n) => n.to_string(),
        SqlValue::I32(n) => n.to_string(),
        SqlValue::I64(n) => n.to_string(),
        SqlValue::F32(f) => float_literal(*f as f64),
        SqlValue::F64(f) => float_literal(*f),
        SqlValue::String(s) => format!("'{}'", escape_string(s)),
        SqlValue::Bytes(b) => format!("TO_BINARY('{}', 'HEX')", hex::encode(b)),
        SqlValue::Uuid(u) => format!("'{}'", u),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::DateTime(dt) => {
            format!("'{}'::TIMESTAMP_NTZ", dt.format("%Y-%m-%d %H:%M:%S%.6f"))
        }
        SqlValue::DateTimeOffset(dto) => format!(
            "'{}'::TIMESTAMP_TZ",
            dto.format("%Y-%m-%d %H:%M:%S%.6f %:z")
        ),
        SqlValue::Date(d) => format!("'{}'::DATE", d.format("%Y-%m-%d")),
        SqlValue::Time(t) => format!("'{}'::TIME", t.format("%H:%M:%S%.6f")),
    }
}

/// Snowflake accepts the special FLOAT values as cast string literals.
fn float_literal(f: f64) -> String {
    if f.is_nan() {
        "'NaN'::FLOAT".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "'inf'::FLOAT".to_string()
        } else {
            "'-inf'::FLOAT".to_string()
        }
    } else {
        f.to_string()
    }
}
