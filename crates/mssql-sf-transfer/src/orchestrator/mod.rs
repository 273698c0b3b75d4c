//! Run orchestration: drives every configured mapping through extraction
//! and load, aggregates the run report and dispatches the notification.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, TransferError};
use crate::mapping::TableMapping;
use crate::notify::{EmailNotifier, LogNotifier, Notifier};
use crate::report::{RunReport, TransferResult};
use crate::source::{MssqlReader, SourceReader};
use crate::target::{SnowflakeLoader, SnowflakePool, TargetLoader};

/// Backoff between connect retries never grows past this.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Where a mapping currently is in its lifecycle, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MappingPhase {
    Extracting,
    Loading,
    Recorded,
}

impl MappingPhase {
    fn as_str(self) -> &'static str {
        match self {
            MappingPhase::Extracting => "extracting",
            MappingPhase::Loading => "loading",
            MappingPhase::Recorded => "recorded",
        }
    }
}

/// Sequential transfer orchestrator.
///
/// Mappings run in declaration order, one at a time; a failure in one
/// mapping is recorded and the next mapping still runs. Loads are
/// append-only, so re-running a successful transfer inserts the rows again.
///
/// The reader, loader and notifier seams carry no cross-mapping state, so a
/// concurrent variant only needs synchronized result collection.
pub struct Orchestrator {
    config: Config,
    reader: Arc<dyn SourceReader>,
    loader: Arc<dyn TargetLoader>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Assemble an orchestrator from explicit components. Tests inject
    /// in-memory fakes here.
    pub fn new(
        config: Config,
        reader: Arc<dyn SourceReader>,
        loader: Arc<dyn TargetLoader>,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            reader,
            loader,
            notifier,
            cancel,
        }
    }

    /// Connect to the configured source and target and assemble the
    /// production orchestrator.
    pub async fn connect(config: Config, cancel: CancellationToken) -> Result<Self> {
        let reader = Arc::new(
            MssqlReader::connect(
                config.source.clone(),
                config.transfer.max_source_connections,
            )
            .await?,
        );
        let pool = Arc::new(SnowflakePool::connect(config.target.clone()).await?);
        let loader = Arc::new(SnowflakeLoader::new(pool.clone(), config.transfer.atomic));

        let notifier: Arc<dyn Notifier> = match &config.notification {
            Some(notification) => Arc::new(EmailNotifier::new(pool, notification.clone())),
            None => Arc::new(LogNotifier),
        };

        Ok(Self::new(config, reader, loader, notifier, cancel))
    }

    /// Run every configured mapping and return the aggregated report.
    ///
    /// The report carries exactly one result per mapping; mappings skipped
    /// by cancellation are recorded as cancelled failures. The notifier is
    /// invoked exactly once, after the last mapping; a notification failure
    /// is logged and never fails the run.
    pub async fn run(&self) -> RunReport {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(self.config.mappings.len());

        info!(
            "Starting transfer run: {} mapping(s), chunk_size={}, atomic={}",
            self.config.mappings.len(),
            self.config.transfer.chunk_size,
            self.config.transfer.atomic
        );

        for mapping in &self.config.mappings {
            let name = mapping.display();
            let start = Instant::now();

            if self.cancel.is_cancelled() {
                warn!("Run cancelled; skipping {}", name);
                results.push(TransferResult::failure(
                    name,
                    0,
                    start.elapsed().as_secs_f64(),
                    &TransferError::Cancelled,
                ));
                continue;
            }

            match self.transfer_mapping(mapping).await {
                Ok(rows) => {
                    let secs = start.elapsed().as_secs_f64();
                    info!(
                        "{} {}: {} rows in {:.1}s ({:.0} rows/s)",
                        MappingPhase::Recorded.as_str(),
                        name,
                        rows,
                        secs,
                        rows as f64 / secs.max(0.001)
                    );
                    results.push(TransferResult::success(name, rows, secs));
                }
                Err((err, rows_committed)) => {
                    let secs = start.elapsed().as_secs_f64();
                    error!(
                        "{} {}: failed after {:.1}s ({} rows committed): {}",
                        MappingPhase::Recorded.as_str(),
                        name,
                        secs,
                        rows_committed,
                        err
                    );
                    results.push(TransferResult::failure(name, rows_committed, secs, &err));
                }
            }
        }

        let report = RunReport::new(started_at, Utc::now(), results);

        if let Err(e) = self.notifier.notify(&report).await {
            error!("Run summary notification failed: {}", e);
        }

        report
    }

    /// Transfer one mapping. On failure, returns the error together with
    /// the rows already committed to the target.
    async fn transfer_mapping(
        &self,
        mapping: &TableMapping,
    ) -> std::result::Result<u64, (TransferError, u64)> {
        let name = mapping.display();
        let chunk_size = self.config.transfer.chunk_size;

        info!("{} {}", MappingPhase::Extracting.as_str(), name);
        let mut stream = self
            .with_connect_retry(&name, || self.reader.open(mapping, chunk_size))
            .await
            .map_err(|e| (e, 0))?;

        let mut session = self
            .with_connect_retry(&name, || self.loader.begin_load(mapping))
            .await
            .map_err(|e| (e, 0))?;

        let mut rows: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                let committed = session.abort().await;
                return Err((TransferError::Cancelled, committed));
            }

            let chunk = match stream.next_chunk().await {
                Ok(Some(records)) => records,
                Ok(None) => break,
                Err(e) => {
                    let committed = session.abort().await;
                    return Err((e, committed));
                }
            };

            if let Err(e) = session.write_batch(&chunk).await {
                let committed = session.abort().await;
                return Err((e, committed));
            }
            rows += chunk.len() as u64;
            info!(
                "{} {}: batch of {} rows ({} so far)",
                MappingPhase::Loading.as_str(),
                name,
                chunk.len(),
                rows
            );
        }

        session.finish().await.map_err(|e| (e, 0))
    }

    /// Retry a connection-establishing operation with bounded exponential
    /// backoff. Only connection errors retry; everything else surfaces
    /// immediately.
    async fn with_connect_retry<T, F, Fut>(
        &self,
        name: &str,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let retries = self.config.transfer.connect_retries;
        let base_ms = self.config.transfer.retry_backoff_ms;
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e)
                    if e.is_connection_error()
                        && attempt < retries
                        && !self.cancel.is_cancelled() =>
                {
                    attempt += 1;
                    let delay = backoff_delay(attempt, base_ms);
                    warn!(
                        "{}: connect attempt {}/{} failed ({}); retrying in {:?}",
                        name, attempt, retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Exponential backoff for connect retries, doubling per attempt up to a
/// fixed cap.
fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
}
