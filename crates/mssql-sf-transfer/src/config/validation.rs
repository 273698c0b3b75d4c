//! Configuration validation.

use super::Config;
use crate::error::{Result, TransferError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(TransferError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(TransferError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(TransferError::Config("source.user is required".into()));
    }

    // Target validation
    if config.target.account.is_empty() {
        return Err(TransferError::Config("target.account is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(TransferError::Config("target.user is required".into()));
    }
    if config.target.warehouse.is_empty() {
        return Err(TransferError::Config("target.warehouse is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(TransferError::Config("target.database is required".into()));
    }

    // Transfer tuning
    if config.transfer.chunk_size == 0 {
        return Err(TransferError::Config(
            "transfer.chunk_size must be at least 1".into(),
        ));
    }
    if config.transfer.max_source_connections == 0 {
        return Err(TransferError::Config(
            "transfer.max_source_connections must be at least 1".into(),
        ));
    }

    if let Some(notification) = &config.notification {
        if notification.integration.is_empty() {
            return Err(TransferError::Config(
                "notification.integration must be non-empty when notification is set".into(),
            ));
        }
        if notification.recipients.is_empty() {
            return Err(TransferError::Config(
                "notification.recipients must list at least one address".into(),
            ));
        }
    }

    // Mappings
    if config.mappings.is_empty() {
        return Err(TransferError::Config(
            "at least one mapping is required".into(),
        ));
    }
    for mapping in &config.mappings {
        mapping.validate()?;
    }

    Ok(())
}
