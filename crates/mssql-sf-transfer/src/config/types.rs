//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::mapping::TableMapping;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MSSQL).
    pub source: SourceConfig,

    /// Target warehouse configuration (Snowflake).
    pub target: TargetConfig,

    /// Transfer behavior configuration.
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Run-summary notification. Absent means log-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationConfig>,

    /// Static table-to-table mappings, processed in declaration order.
    pub mappings: Vec<TableMapping>,
}

/// Source database (MSSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Default database for mappings that do not carry a database part.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Target warehouse (Snowflake) configuration, connected over ODBC.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Snowflake account identifier (e.g. "xy12345.us-east-1").
    pub account: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Role to assume after connecting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Virtual warehouse to run loads on.
    pub warehouse: String,

    /// Database holding the target tables.
    pub database: String,

    /// Schema for unqualified target table names.
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// ODBC driver name (default: "SnowflakeDSIIDriver").
    #[serde(default = "default_sf_driver")]
    pub driver: String,
}

impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("role", &self.role)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("driver", &self.driver)
            .finish()
    }
}

/// Transfer behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Rows per read chunk and per INSERT batch (default: 50,000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Connection-establishment retries before a mapping is recorded as
    /// failed (default: 3). Applies only to connect failures.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Initial retry backoff in milliseconds; doubles per attempt up to a
    /// fixed cap (default: 500).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Load each table inside a single transaction (default: true). When
    /// false, each batch commits on its own and a mid-table failure leaves
    /// the rows already committed in place.
    #[serde(default = "default_true")]
    pub atomic: bool,

    /// Maximum pooled source connections (default: 4).
    #[serde(default = "default_max_source_connections")]
    pub max_source_connections: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            connect_retries: default_connect_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            atomic: true,
            max_source_connections: default_max_source_connections(),
        }
    }
}

/// Run-summary notification configuration.
///
/// Sent through the target's `SYSTEM$SEND_EMAIL` notification integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Name of the Snowflake notification integration.
    pub integration: String,

    /// Recipient email addresses.
    pub recipients: Vec<String>,

    /// Subject prefix; the run outcome is appended (default: "MSSQL transfer").
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

/// Credential override document for the source, parsed from JSON.
#[derive(Clone, Deserialize)]
pub struct SourceCredentials {
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Credential override document for the target, parsed from JSON.
#[derive(Clone, Deserialize)]
pub struct TargetCredentials {
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
}

// Default value functions for serde

fn default_mssql_port() -> u16 {
    1433
}

fn default_public_schema() -> String {
    "PUBLIC".to_string()
}

fn default_sf_driver() -> String {
    "SnowflakeDSIIDriver".to_string()
}

fn default_chunk_size() -> usize {
    50_000
}

fn default_connect_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_source_connections() -> u32 {
    4
}

fn default_subject_prefix() -> String {
    "MSSQL transfer".to_string()
}

fn default_true() -> bool {
    true
}
