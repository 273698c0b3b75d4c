//! Error types for the transfer library.

use thiserror::Error;

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database query or protocol error
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// Source connection could not be established or was lost mid-read
    #[error("Source unavailable: {message}\n  Context: {context}")]
    SourceUnavailable { message: String, context: String },

    /// Target connection could not be established or was lost mid-load
    #[error("Target unavailable: {message}\n  Context: {context}")]
    TargetUnavailable { message: String, context: String },

    /// A mapped column is absent from the source table, or its type
    /// cannot be reconciled with the target
    #[error("Schema mismatch for {table}: {message}")]
    SchemaMismatch { table: String, message: String },

    /// A numeric value exceeds the target's representable precision
    #[error("Precision loss in column {column}: {message}")]
    PrecisionLoss { column: String, message: String },

    /// A text or binary value cannot be represented in the target encoding
    #[error("Encoding error in column {column}: {message}")]
    Encoding { column: String, message: String },

    /// The target rejected a batch (constraint violation, type mismatch)
    #[error("Load rejected for table {table}: {message}")]
    LoadRejected { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, SIGTERM, timeout)
    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Create a SourceUnavailable error with context about where it occurred.
    pub fn source_unavailable(message: impl Into<String>, context: impl Into<String>) -> Self {
        TransferError::SourceUnavailable {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a TargetUnavailable error with context about where it occurred.
    pub fn target_unavailable(message: impl Into<String>, context: impl Into<String>) -> Self {
        TransferError::TargetUnavailable {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a SchemaMismatch error.
    pub fn schema_mismatch(table: impl Into<String>, message: impl Into<String>) -> Self {
        TransferError::SchemaMismatch {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a LoadRejected error.
    pub fn load_rejected(table: impl Into<String>, message: impl Into<String>) -> Self {
        TransferError::LoadRejected {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a connection-establishment failure that may be
    /// retried locally with backoff. Everything else is recorded as-is and
    /// left to the next scheduled run.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            TransferError::SourceUnavailable { .. } | TransferError::TargetUnavailable { .. }
        )
    }

    /// Stable kind label used in reports and notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::Config(_) => "config",
            TransferError::Source(_) => "source",
            TransferError::SourceUnavailable { .. } => "source_unavailable",
            TransferError::TargetUnavailable { .. } => "target_unavailable",
            TransferError::SchemaMismatch { .. } => "schema_mismatch",
            TransferError::PrecisionLoss { .. } => "precision_loss",
            TransferError::Encoding { .. } => "encoding",
            TransferError::LoadRejected { .. } => "load_rejected",
            TransferError::Io(_) => "io",
            TransferError::Yaml(_) => "yaml",
            TransferError::Json(_) => "json",
            TransferError::Cancelled => "cancelled",
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            TransferError::Config(_) | TransferError::Yaml(_) | TransferError::Json(_) => 1,
            TransferError::SourceUnavailable { .. } | TransferError::Source(_) => 2,
            TransferError::TargetUnavailable { .. } => 3,
            TransferError::SchemaMismatch { .. } => 4,
            TransferError::PrecisionLoss { .. } | TransferError::Encoding { .. } => 5,
            TransferError::LoadRejected { .. } => 6,
            TransferError::Io(_) => 7,
            TransferError::Cancelled => 8,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
