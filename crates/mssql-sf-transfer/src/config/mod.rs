//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::error::Result;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Overlay source credentials from a separate JSON document.
    pub fn apply_source_credentials(&mut self, credentials: SourceCredentials) {
        self.source.user = credentials.user;
        self.source.password = credentials.password;
        if let Some(host) = credentials.host {
            self.source.host = host;
        }
        if let Some(port) = credentials.port {
            self.source.port = port;
        }
    }

    /// Overlay target credentials from a separate JSON document.
    pub fn apply_target_credentials(&mut self, credentials: TargetCredentials) {
        self.target.user = credentials.user;
        self.target.password = credentials.password;
        if let Some(account) = credentials.account {
            self.target.account = account;
        }
        if let Some(role) = credentials.role {
            self.target.role = Some(role);
        }
        if let Some(warehouse) = credentials.warehouse {
            self.target.warehouse = warehouse;
        }
    }
}

impl SourceCredentials {
    /// Load a source credential document from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl TargetCredentials {
    /// Load a target credential document from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl TargetConfig {
    /// Build an ODBC connection string for the Snowflake driver.
    pub fn connection_string(&self) -> String {
        let mut conn = format!(
            "Driver={{{}}};Server={}.snowflakecomputing.com;Uid={};Pwd={};\
             Warehouse={};Database={};Schema={}",
            self.driver,
            self.account,
            self.user,
            self.password,
            self.warehouse,
            self.database,
            self.schema
        );
        if let Some(role) = &self.role {
            conn.push_str(&format!(";Role={}", role));
        }
        conn
    }

    /// Fully qualify a target table name against this config's database and
    /// schema, unless the mapping already qualifies it.
    pub fn qualify_table(&self, table: &str) -> String {
        if table.contains('.') {
            table.to_string()
        } else {
            format!("{}.{}.{}", self.database, self.schema, table)
        }
    }
}
