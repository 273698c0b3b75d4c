//! Run-summary notification.
//!
//! The report is handed to exactly one notifier per run. Delivery failures
//! are the orchestrator's to log; they never fail the run itself.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::NotificationConfig;
use crate::error::Result;
use crate::report::RunReport;
use crate::target::SnowflakePool;

/// Consumer of the finished run report.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &RunReport) -> Result<()>;
}

/// Emails the run summary through Snowflake's `SYSTEM$SEND_EMAIL` stored
/// procedure and a pre-created notification integration.
pub struct EmailNotifier {
    pool: Arc<SnowflakePool>,
    config: NotificationConfig,
}

impl EmailNotifier {
    pub fn new(pool: Arc<SnowflakePool>, config: NotificationConfig) -> Self {
        Self { pool, config }
    }

    fn subject(&self, report: &RunReport) -> String {
        subject_for(&self.config.subject_prefix, report)
    }
}

/// Distinct subjects for a clean run and a run with any failure.
fn subject_for(prefix: &str, report: &RunReport) -> String {
    if report.all_succeeded() {
        format!("{}: Success", prefix)
    } else {
        format!("{}: Failed", prefix)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, report: &RunReport) -> Result<()> {
        let sql = build_send_email_sql(
            &self.config.integration,
            &self.config.recipients,
            &self.subject(report),
            &report.render_summary(),
        );
        self.pool.execute(&sql)?;
        info!(
            "Emailed run summary to {} recipient(s) via integration '{}'",
            self.config.recipients.len(),
            self.config.integration
        );
        Ok(())
    }
}

/// Fallback notifier that writes the summary to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, report: &RunReport) -> Result<()> {
        info!("Run summary:\n{}", report.render_summary());
        Ok(())
    }
}

/// `SYSTEM$SEND_EMAIL` only accepts plain string literals, so quotes are
/// stripped from the body rather than escaped.
fn build_send_email_sql(
    integration: &str,
    recipients: &[String],
    subject: &str,
    body: &str,
) -> String {
    format!(
        "CALL SYSTEM$SEND_EMAIL('{}', '{}', '{}', '{}')",
        strip_quotes(integration),
        strip_quotes(&recipients.join(", ")),
        strip_quotes(subject),
        strip_quotes(body)
    )
}

fn strip_quotes(s: &str) -> String {
    s.replace(['\'', '"'], "")
}
