//! MSSQL source database operations.

use std::sync::Arc;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{AuthMethod, Client, EncryptionLevel, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapter;
use crate::config::SourceConfig;
use crate::error::{Result, TransferError};
use crate::mapping::TableMapping;
use crate::typemap;
use crate::value::{Record, SqlNullType, SqlValue};

/// A bounded stream of adapted records for one table mapping.
///
/// `next_chunk` returns `None` once the table is exhausted. Chunks are read
/// with stable paging against the source, so the stream is not restartable.
#[async_trait]
pub trait RecordStream: Send {
    async fn next_chunk(&mut self) -> Result<Option<Vec<Record>>>;
}

/// Trait for opening per-mapping reads against the source.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Validate the mapping against the source schema and open a chunked
    /// record stream. Schema validation happens here, on first use, not at
    /// configuration load.
    async fn open(
        &self,
        mapping: &TableMapping,
        chunk_size: usize,
    ) -> Result<Box<dyn RecordStream>>;
}

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: SourceConfig,
}

impl TiberiusConnectionManager {
    fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> tiberius::Config {
        let mut config = tiberius::Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Column metadata captured from `INFORMATION_SCHEMA.COLUMNS`, needed to
/// decode rows and drive value normalization.
#[derive(Debug, Clone)]
struct SourceColumn {
    name: String,
    data_type: String,
    max_length: i32,
    precision: i32,
    scale: i32,
}

/// One mapped column ready for extraction.
#[derive(Debug, Clone)]
struct BoundColumn {
    source: String,
    data_type: String,
    target_type: String,
}

/// MSSQL source reader over a bb8 connection pool.
///
/// One pool serves every mapping; mappings that name a different database
/// are read through fully qualified three-part names.
pub struct MssqlReader {
    pool: Pool<TiberiusConnectionManager>,
    config: SourceConfig,
}

impl MssqlReader {
    /// Create the reader and verify connectivity with a probe query.
    pub async fn connect(config: SourceConfig, max_connections: u32) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(max_connections)
            .min_idle(Some(1))
            .build(manager)
            .await
            .map_err(|e| {
                TransferError::source_unavailable(e.to_string(), "building MSSQL pool")
            })?;

        {
            let mut conn = pool.get().await.map_err(|e| {
                TransferError::source_unavailable(e.to_string(), "connecting to MSSQL")
            })?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={})",
            config.host, config.port, config.database, max_connections
        );

        Ok(Self { pool, config })
    }

    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| TransferError::source_unavailable(e.to_string(), "getting MSSQL connection"))
    }

    /// Load column metadata for a table from its database's
    /// `INFORMATION_SCHEMA.COLUMNS`.
    async fn load_columns(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<SourceColumn>> {
        let mut client = self.get_client().await?;

        let sql = format!(
            r#"
            SELECT
                COLUMN_NAME,
                DATA_TYPE,
                CAST(ISNULL(CHARACTER_MAXIMUM_LENGTH, 0) AS INT),
                CAST(ISNULL(NUMERIC_PRECISION, 0) AS INT),
                CAST(ISNULL(NUMERIC_SCALE, 0) AS INT)
            FROM {}.INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            ORDER BY ORDINAL_POSITION
            "#,
            quote_ident(database)
        );

        let mut query = Query::new(sql);
        query.bind(schema);
        query.bind(table);

        let stream = query.query(&mut client).await?;
        let rows = stream.into_first_result().await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(SourceColumn {
                name: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                data_type: row.get::<&str, _>(1).unwrap_or_default().to_string(),
                max_length: row.get::<i32, _>(2).unwrap_or(0),
                precision: row.get::<i32, _>(3).unwrap_or(0),
                scale: row.get::<i32, _>(4).unwrap_or(0),
            });
        }

        debug!(
            "Loaded {} columns for {}.{}.{}",
            columns.len(),
            database,
            schema,
            table
        );
        Ok(columns)
    }
}

#[async_trait]
impl SourceReader for MssqlReader {
    async fn open(
        &self,
        mapping: &TableMapping,
        chunk_size: usize,
    ) -> Result<Box<dyn RecordStream>> {
        let parts = mapping.source_parts()?;
        let database = parts
            .database
            .clone()
            .unwrap_or_else(|| self.config.database.clone());

        let source_columns = self
            .load_columns(&database, &parts.schema, &parts.table)
            .await?;
        if source_columns.is_empty() {
            return Err(TransferError::schema_mismatch(
                mapping.display(),
                format!(
                    "source table {}.{}.{} not found",
                    database, parts.schema, parts.table
                ),
            ));
        }

        // Bind each mapped column to its source metadata. A mapped column
        // absent from the source fails the whole mapping.
        let mut bound = Vec::with_capacity(mapping.columns.len());
        let mut missing = Vec::new();
        for column in &mapping.columns {
            match source_columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&column.source))
            {
                Some(meta) => {
                    let target_type = column.type_hint.clone().unwrap_or_else(|| {
                        typemap::mssql_to_snowflake(
                            &meta.data_type,
                            meta.max_length,
                            meta.precision,
                            meta.scale,
                        )
                    });
                    bound.push(BoundColumn {
                        source: meta.name.clone(),
                        data_type: meta.data_type.clone(),
                        target_type,
                    });
                }
                None => missing.push(column.source.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(TransferError::schema_mismatch(
                mapping.display(),
                format!("mapped columns not found in source: {}", missing.join(", ")),
            ));
        }

        let select_list = bound
            .iter()
            .map(|c| quote_ident(&c.source))
            .collect::<Vec<_>>()
            .join(", ");
        let base_sql = format!(
            "SELECT {} FROM {}.{}.{}",
            select_list,
            quote_ident(&database),
            quote_ident(&parts.schema),
            quote_ident(&parts.table)
        );

        let target_columns: Arc<[String]> = mapping.target_columns().into();

        debug!("Opened read for {} (chunk_size={})", mapping.display(), chunk_size);

        Ok(Box::new(MssqlRecordStream {
            pool: self.pool.clone(),
            mapping_name: mapping.display(),
            base_sql,
            columns: bound,
            target_columns,
            chunk_size,
            offset: 0,
            exhausted: false,
        }))
    }
}

/// Chunked record stream over OFFSET/FETCH paging.
struct MssqlRecordStream {
    pool: Pool<TiberiusConnectionManager>,
    mapping_name: String,
    base_sql: String,
    columns: Vec<BoundColumn>,
    target_columns: Arc<[String]>,
    chunk_size: usize,
    offset: u64,
    exhausted: bool,
}

#[async_trait]
impl RecordStream for MssqlRecordStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<Record>>> {
        if self.exhausted {
            return Ok(None);
        }

        let sql = format!(
            "{} ORDER BY (SELECT NULL) OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            self.base_sql, self.offset, self.chunk_size
        );

        let mut client = self.pool.get().await.map_err(|e| {
            TransferError::source_unavailable(e.to_string(), "getting MSSQL connection")
        })?;
        let stream = client
            .simple_query(&sql)
            .await
            .map_err(|e| classify_read_error(&self.mapping_name, e))?;
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| classify_read_error(&self.mapping_name, e))?;

        if rows.len() < self.chunk_size {
            self.exhausted = true;
        }
        if rows.is_empty() {
            return Ok(None);
        }
        self.offset += rows.len() as u64;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(self.columns.len());
            for (idx, column) in self.columns.iter().enumerate() {
                let raw = convert_row_value(&row, idx, &column.data_type);
                let value = adapter::normalize(&column.source, raw, &column.target_type)
                    .map_err(|e| self.with_table_context(e))?;
                values.push(value);
            }
            records.push(Record::new(self.target_columns.clone(), values));
        }

        debug!(
            "Read chunk of {} rows from {} (offset now {})",
            records.len(),
            self.mapping_name,
            self.offset
        );
        Ok(Some(records))
    }
}

impl MssqlRecordStream {
    /// Attach the mapping name to adapter errors raised without one.
    fn with_table_context(&self, err: TransferError) -> TransferError {
        match err {
            TransferError::SchemaMismatch { table, message } if table.is_empty() => {
                TransferError::schema_mismatch(self.mapping_name.clone(), message)
            }
            other => other,
        }
    }
}

/// Bracket-quote an MSSQL identifier.
fn quote_ident(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// Classify a mid-read driver failure. Transport-level errors mean the
/// connection was lost; everything else is a query failure.
fn classify_read_error(table: &str, err: tiberius::error::Error) -> TransferError {
    match &err {
        tiberius::error::Error::Io { .. } | tiberius::error::Error::Routing { .. } => {
            TransferError::source_unavailable(err.to_string(), format!("reading {}", table))
        }
        _ => TransferError::Source(err),
    }
}

/// Convert a row value to SqlValue based on the column type.
fn convert_row_value(row: &Row, idx: usize, data_type: &str) -> SqlValue {
    let dt = data_type.to_lowercase();

    match dt.as_str() {
        "bit" => row
            .get::<bool, _>(idx)
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null(SqlNullType::Bool)),
        "tinyint" => row
            .get::<u8, _>(idx)
            .map(|v| SqlValue::I16(v as i16))
            .unwrap_or(SqlValue::Null(SqlNullType::I16)),
        "smallint" => row
            .get::<i16, _>(idx)
            .map(SqlValue::I16)
            .unwrap_or(SqlValue::Null(SqlNullType::I16)),
        "int" => row
            .get::<i32, _>(idx)
            .map(SqlValue::I32)
            .unwrap_or(SqlValue::Null(SqlNullType::I32)),
        "bigint" => row
            .get::<i64, _>(idx)
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null(SqlNullType::I64)),
        "real" => row
            .get::<f32, _>(idx)
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null(SqlNullType::F32)),
        "float" => row
            .get::<f64, _>(idx)
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null(SqlNullType::F64)),
        "uniqueidentifier" => row
            .get::<Uuid, _>(idx)
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null(SqlNullType::Uuid)),
        "datetime" | "datetime2" | "smalldatetime" => row
            .get::<NaiveDateTime, _>(idx)
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTime)),
        "datetimeoffset" => row
            .get::<chrono::DateTime<chrono::FixedOffset>, _>(idx)
            .map(SqlValue::DateTimeOffset)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTimeOffset)),
        "date" => row
            .get::<NaiveDate, _>(idx)
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null(SqlNullType::Date)),
        "time" => row
            .get::<NaiveTime, _>(idx)
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null(SqlNullType::Time)),
        "binary" | "varbinary" | "image" => row
            .get::<&[u8], _>(idx)
            .map(|v| SqlValue::Bytes(v.to_vec()))
            .unwrap_or(SqlValue::Null(SqlNullType::Bytes)),
        "decimal" | "numeric" | "money" | "smallmoney" => {
            // Decimal comes back most reliably as text
            row.get::<&str, _>(idx)
                .and_then(|s| s.parse::<rust_decimal::Decimal>().ok())
                .map(SqlValue::Decimal)
                .or_else(|| {
                    row.get::<f64, _>(idx).map(|f| {
                        rust_decimal::Decimal::try_from(f)
                            .map(SqlValue::Decimal)
                            .unwrap_or(SqlValue::F64(f))
                    })
                })
                .unwrap_or(SqlValue::Null(SqlNullType::Decimal))
        }
        _ => {
            // Default: treat as string (covers varchar, nvarchar, char, nchar, text, ntext, xml, etc.)
            row.get::<&str, _>(idx)
                .map(|s| SqlValue::String(s.to_string()))
                .unwrap_or(SqlValue::Null(SqlNullType::String))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_brackets() {
        assert_eq!(quote_ident("Employees"), "[Employees]");
        assert_eq!(quote_ident("odd]name"), "[odd]]name]");
    }

    #[test]
    fn test_date_and_time_columns_decode_as_their_own_chrono_types() {
        use tiberius::time::{Date, Time};
        use tiberius::{ColumnData, FromSql};

        // The driver hands DATE and TIME columns back as dedicated wire
        // types, not as datetime variants.
        let date = ColumnData::Date(Some(Date::new(738_000)));
        assert!(<NaiveDate as FromSql>::from_sql(&date).unwrap().is_some());
        assert!(<NaiveDateTime as FromSql>::from_sql(&date).is_err());

        let time = ColumnData::Time(Some(Time::new(45_296, 0)));
        assert!(<NaiveTime as FromSql>::from_sql(&time).unwrap().is_some());
        assert!(<NaiveDateTime as FromSql>::from_sql(&time).is_err());
    }

    #[test]
    fn test_lost_connection_mid_read_is_source_unavailable() {
        let lost = tiberius::error::Error::Io {
            kind: std::io::ErrorKind::ConnectionReset,
            message: "connection reset by peer".to_string(),
        };
        let err = classify_read_error("HR.dbo.Employees -> EMPLOYEES", lost);
        assert_eq!(err.kind(), "source_unavailable");

        let query = tiberius::error::Error::Protocol("unexpected token".into());
        let err = classify_read_error("HR.dbo.Employees -> EMPLOYEES", query);
        assert_eq!(err.kind(), "source");
    }
}
