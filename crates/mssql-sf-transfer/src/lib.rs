//! # mssql-sf-transfer
//!
//! Batch table transfer library from Microsoft SQL Server to Snowflake.
//!
//! Transfers are driven by a static table-to-table mapping and run
//! sequentially with per-table failure isolation:
//!
//! - **Chunked reads** over TDS with stable OFFSET/FETCH paging
//! - **Transactional loads** via multi-row INSERT batches over ODBC
//! - **Type adaptation** between MSSQL and Snowflake, failing loudly on
//!   precision loss or unrepresentable values
//! - **Run reports** aggregated per mapping and emailed through
//!   `SYSTEM$SEND_EMAIL`
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_sf_transfer::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mssql_sf_transfer::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(config, CancellationToken::new()).await?;
//!     let report = orchestrator.run().await;
//!     println!("Transferred {} rows", report.total_rows());
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod mapping;
pub mod notify;
pub mod orchestrator;
pub mod report;
pub mod source;
pub mod target;
pub mod typemap;
pub mod value;

// Re-exports for convenient access
pub use config::{
    Config, NotificationConfig, SourceConfig, SourceCredentials, TargetConfig, TargetCredentials,
    TransferConfig,
};
pub use error::{Result, TransferError};
pub use mapping::{ColumnMapping, LoadMode, TableMapping};
pub use notify::{EmailNotifier, LogNotifier, Notifier};
pub use orchestrator::Orchestrator;
pub use report::{RunReport, TransferResult, TransferStatus};
pub use source::{MssqlReader, RecordStream, SourceReader};
pub use target::{LoadSession, SnowflakeLoader, SnowflakePool, TargetLoader};
pub use value::{Record, SqlNullType, SqlValue};
