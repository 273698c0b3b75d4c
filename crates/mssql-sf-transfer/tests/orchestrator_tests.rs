//! Orchestrator behavior tests against in-memory reader/loader/notifier
//! fakes wired through the trait seams.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mssql_sf_transfer::{
    ColumnMapping, Config, LoadMode, LoadSession, Notifier, Orchestrator, Record, RecordStream,
    Result, RunReport, SourceConfig, SourceReader, SqlNullType, SqlValue, TableMapping,
    TargetConfig, TargetLoader, TransferConfig, TransferError,
};

fn test_config(mappings: Vec<TableMapping>) -> Config {
    Config {
        source: SourceConfig {
            host: "localhost".into(),
            port: 1433,
            database: "HR".into(),
            user: "sa".into(),
            password: "pw".into(),
            encrypt: false,
            trust_server_cert: true,
        },
        target: TargetConfig {
            account: "acct".into(),
            user: "LOADER".into(),
            password: "pw".into(),
            role: None,
            warehouse: "WH".into(),
            database: "ANALYTICS".into(),
            schema: "PUBLIC".into(),
            driver: "SnowflakeDSIIDriver".into(),
        },
        transfer: TransferConfig {
            chunk_size: 2,
            connect_retries: 3,
            retry_backoff_ms: 1,
            atomic: true,
            max_source_connections: 1,
        },
        notification: None,
        mappings,
    }
}

fn mapping(source: &str, target: &str) -> TableMapping {
    TableMapping {
        source: source.to_string(),
        target: target.to_string(),
        columns: vec![
            ColumnMapping {
                source: "id".into(),
                target: "ID".into(),
                type_hint: None,
            },
            ColumnMapping {
                source: "name".into(),
                target: "NAME".into(),
                type_hint: None,
            },
        ],
        mode: LoadMode::Append,
    }
}

fn record(id: i32, name: Option<&str>) -> Record {
    let columns: Arc<[String]> = vec!["ID".to_string(), "NAME".to_string()].into();
    Record::new(
        columns,
        vec![
            SqlValue::I32(id),
            name.map(|n| SqlValue::String(n.into()))
                .unwrap_or(SqlValue::Null(SqlNullType::String)),
        ],
    )
}

// ---------------------------------------------------------------------------
// Fakes

#[derive(Default)]
struct FakeReader {
    /// Chunks per source table name, cloned into each opened stream.
    chunks: HashMap<String, Vec<Vec<Record>>>,
    /// Errors returned by `open`, consumed front to back per table.
    open_failures: Mutex<HashMap<String, VecDeque<TransferError>>>,
    open_calls: Mutex<HashMap<String, usize>>,
}

impl FakeReader {
    fn with_table(mut self, source: &str, chunks: Vec<Vec<Record>>) -> Self {
        self.chunks.insert(source.to_string(), chunks);
        self
    }

    fn with_open_failures(self, source: &str, errors: Vec<TransferError>) -> Self {
        self.open_failures
            .lock()
            .unwrap()
            .insert(source.to_string(), errors.into());
        self
    }

    fn open_calls(&self, source: &str) -> usize {
        *self.open_calls.lock().unwrap().get(source).unwrap_or(&0)
    }
}

#[async_trait]
impl SourceReader for FakeReader {
    async fn open(
        &self,
        mapping: &TableMapping,
        _chunk_size: usize,
    ) -> Result<Box<dyn RecordStream>> {
        *self
            .open_calls
            .lock()
            .unwrap()
            .entry(mapping.source.clone())
            .or_insert(0) += 1;

        if let Some(queue) = self.open_failures.lock().unwrap().get_mut(&mapping.source) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }

        let chunks = self.chunks.get(&mapping.source).cloned().unwrap_or_default();
        Ok(Box::new(FakeStream {
            chunks: chunks.into(),
        }))
    }
}

struct FakeStream {
    chunks: VecDeque<Vec<Record>>,
}

#[async_trait]
impl RecordStream for FakeStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<Record>>> {
        Ok(self.chunks.pop_front())
    }
}

type Storage = Arc<Mutex<HashMap<String, Vec<Record>>>>;

#[derive(Default)]
struct FakeLoader {
    storage: Storage,
    atomic: bool,
    /// Target tables whose first batch write is rejected.
    reject_tables: Mutex<HashMap<String, TransferError>>,
    begin_failures: Mutex<HashMap<String, VecDeque<TransferError>>>,
    begin_calls: Mutex<HashMap<String, usize>>,
}

impl FakeLoader {
    fn atomic(storage: Storage) -> Self {
        Self {
            storage,
            atomic: true,
            ..Default::default()
        }
    }

    fn non_atomic(storage: Storage) -> Self {
        Self {
            storage,
            atomic: false,
            ..Default::default()
        }
    }

    fn rejecting(self, target: &str, err: TransferError) -> Self {
        self.reject_tables
            .lock()
            .unwrap()
            .insert(target.to_string(), err);
        self
    }

    fn with_begin_failures(self, target: &str, errors: Vec<TransferError>) -> Self {
        self.begin_failures
            .lock()
            .unwrap()
            .insert(target.to_string(), errors.into());
        self
    }

    fn begin_calls(&self, target: &str) -> usize {
        *self.begin_calls.lock().unwrap().get(target).unwrap_or(&0)
    }
}

#[async_trait]
impl TargetLoader for FakeLoader {
    async fn begin_load(&self, mapping: &TableMapping) -> Result<Box<dyn LoadSession>> {
        *self
            .begin_calls
            .lock()
            .unwrap()
            .entry(mapping.target.clone())
            .or_insert(0) += 1;

        if let Some(queue) = self.begin_failures.lock().unwrap().get_mut(&mapping.target) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }

        let reject = self.reject_tables.lock().unwrap().remove(&mapping.target);
        Ok(Box::new(FakeSession {
            table: mapping.target.clone(),
            storage: self.storage.clone(),
            atomic: self.atomic,
            pending: Vec::new(),
            committed: 0,
            reject,
        }))
    }
}

struct FakeSession {
    table: String,
    storage: Storage,
    atomic: bool,
    pending: Vec<Record>,
    committed: u64,
    reject: Option<TransferError>,
}

#[async_trait]
impl LoadSession for FakeSession {
    async fn write_batch(&mut self, records: &[Record]) -> Result<()> {
        if let Some(err) = self.reject.take() {
            return Err(err);
        }
        if self.atomic {
            self.pending.extend_from_slice(records);
        } else {
            self.storage
                .lock()
                .unwrap()
                .entry(self.table.clone())
                .or_default()
                .extend_from_slice(records);
            self.committed += records.len() as u64;
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<u64> {
        let pending = self.pending.len() as u64;
        self.storage
            .lock()
            .unwrap()
            .entry(self.table.clone())
            .or_default()
            .extend(self.pending);
        Ok(self.committed + pending)
    }

    async fn abort(self: Box<Self>) -> u64 {
        // Atomic sessions drop pending rows; non-atomic ones already
        // committed per batch.
        self.committed
    }
}

#[derive(Default)]
struct FakeNotifier {
    calls: AtomicUsize,
    last: Mutex<Option<RunReport>>,
    fail: bool,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, report: &RunReport) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(report.clone());
        if self.fail {
            return Err(TransferError::target_unavailable(
                "integration down",
                "notify",
            ));
        }
        Ok(())
    }
}

fn orchestrator(
    config: Config,
    reader: Arc<FakeReader>,
    loader: Arc<FakeLoader>,
    notifier: Arc<FakeNotifier>,
) -> Orchestrator {
    Orchestrator::new(config, reader, loader, notifier, CancellationToken::new())
}

// ---------------------------------------------------------------------------
// Tests

#[tokio::test]
async fn failure_in_one_mapping_does_not_stop_the_rest() {
    let storage: Storage = Default::default();
    let reader = Arc::new(
        FakeReader::default()
            .with_table("dbo.a", vec![vec![record(1, Some("x"))]])
            .with_table("dbo.b", vec![vec![record(2, Some("y"))]])
            .with_table("dbo.c", vec![vec![record(3, Some("z"))]]),
    );
    let loader = Arc::new(
        FakeLoader::atomic(storage.clone())
            .rejecting("B", TransferError::load_rejected("B", "unique constraint")),
    );
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![
        mapping("dbo.a", "A"),
        mapping("dbo.b", "B"),
        mapping("dbo.c", "C"),
    ]);
    let report = orchestrator(config, reader, loader, notifier).run().await;

    assert_eq!(report.results.len(), 3);
    assert!(report.results[0].is_success());
    assert!(!report.results[1].is_success());
    assert!(report.results[2].is_success());
    assert_eq!(
        report.results[1].error_kind.as_deref(),
        Some("load_rejected")
    );

    // The failed table stored nothing, the others stored their rows.
    let stored = storage.lock().unwrap();
    assert_eq!(stored.get("A").map(Vec::len), Some(1));
    assert!(stored.get("B").is_none());
    assert_eq!(stored.get("C").map(Vec::len), Some(1));
}

#[tokio::test]
async fn empty_table_is_a_zero_row_success() {
    let storage: Storage = Default::default();
    let reader = Arc::new(FakeReader::default().with_table("dbo.empty", vec![]));
    let loader = Arc::new(FakeLoader::atomic(storage));
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.empty", "EMPTY")]);
    let report = orchestrator(config, reader, loader, notifier).run().await;

    assert!(report.all_succeeded());
    assert_eq!(report.results[0].rows_transferred, 0);
}

#[tokio::test]
async fn nulls_survive_end_to_end() {
    let storage: Storage = Default::default();
    let reader = Arc::new(
        FakeReader::default().with_table("dbo.a", vec![vec![record(1, None)]]),
    );
    let loader = Arc::new(FakeLoader::atomic(storage.clone()));
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.a", "A")]);
    let report = orchestrator(config, reader, loader, notifier).run().await;

    assert!(report.all_succeeded());
    let stored = storage.lock().unwrap();
    let rows = stored.get("A").unwrap();
    assert_eq!(rows[0].get("NAME"), Some(&SqlValue::Null(SqlNullType::String)));
}

#[tokio::test]
async fn rerun_appends_rows_again() {
    let storage: Storage = Default::default();
    let reader = Arc::new(
        FakeReader::default().with_table(
            "dbo.a",
            vec![vec![record(1, Some("x")), record(2, Some("y"))]],
        ),
    );
    let loader = Arc::new(FakeLoader::atomic(storage.clone()));
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.a", "A")]);
    let orch = orchestrator(config, reader, loader, notifier);

    let first = orch.run().await;
    let second = orch.run().await;
    assert!(first.all_succeeded());
    assert!(second.all_succeeded());

    // Append-only load: a repeated run doubles the stored rows.
    assert_eq!(storage.lock().unwrap().get("A").map(Vec::len), Some(4));
}

#[tokio::test]
async fn mid_load_failure_in_atomic_mode_reports_zero_committed() {
    let storage: Storage = Default::default();
    let reader = Arc::new(
        FakeReader::default().with_table("dbo.a", vec![vec![record(1, Some("x"))]]),
    );
    let loader = Arc::new(
        FakeLoader::atomic(storage.clone())
            .rejecting("A", TransferError::load_rejected("A", "type clash")),
    );
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.a", "A")]);
    let report = orchestrator(config, reader, loader, notifier).run().await;

    assert!(!report.all_succeeded());
    assert_eq!(report.results[0].rows_transferred, 0);
    assert!(storage.lock().unwrap().get("A").is_none());
}

#[tokio::test]
async fn non_atomic_failure_reports_rows_already_committed() {
    let storage: Storage = Default::default();
    // First chunk commits, read of the second chunk fails.
    let reader = Arc::new(FakeReaderWithReadError {
        first_chunk: vec![record(1, Some("x")), record(2, Some("y"))],
    });
    let loader = Arc::new(FakeLoader::non_atomic(storage.clone()));
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.a", "A")]);
    let report = Orchestrator::new(
        config,
        reader,
        loader,
        notifier,
        CancellationToken::new(),
    )
    .run()
    .await;

    assert!(!report.all_succeeded());
    assert_eq!(report.results[0].rows_transferred, 2);
    assert_eq!(storage.lock().unwrap().get("A").map(Vec::len), Some(2));
}

struct FakeReaderWithReadError {
    first_chunk: Vec<Record>,
}

#[async_trait]
impl SourceReader for FakeReaderWithReadError {
    async fn open(
        &self,
        _mapping: &TableMapping,
        _chunk_size: usize,
    ) -> Result<Box<dyn RecordStream>> {
        Ok(Box::new(FailingStream {
            chunk: Some(self.first_chunk.clone()),
        }))
    }
}

struct FailingStream {
    chunk: Option<Vec<Record>>,
}

#[async_trait]
impl RecordStream for FailingStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<Record>>> {
        match self.chunk.take() {
            Some(records) => Ok(Some(records)),
            None => Err(TransferError::source_unavailable(
                "connection reset",
                "reading chunk",
            )),
        }
    }
}

#[tokio::test]
async fn connect_failures_retry_with_backoff_until_success() {
    let storage: Storage = Default::default();
    let reader = Arc::new(
        FakeReader::default()
            .with_table("dbo.a", vec![vec![record(1, Some("x"))]])
            .with_open_failures(
                "dbo.a",
                vec![
                    TransferError::source_unavailable("refused", "connect"),
                    TransferError::source_unavailable("refused", "connect"),
                ],
            ),
    );
    let loader = Arc::new(FakeLoader::atomic(storage));
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.a", "A")]);
    let orch = orchestrator(config, reader.clone(), loader, notifier);
    let report = orch.run().await;

    assert!(report.all_succeeded());
    assert_eq!(reader.open_calls("dbo.a"), 3);
}

#[tokio::test]
async fn connect_retries_are_bounded() {
    let reader = Arc::new(FakeReader::default().with_open_failures(
        "dbo.a",
        vec![
            TransferError::source_unavailable("refused", "connect"),
            TransferError::source_unavailable("refused", "connect"),
            TransferError::source_unavailable("refused", "connect"),
            TransferError::source_unavailable("refused", "connect"),
        ],
    ));
    let loader = Arc::new(FakeLoader::atomic(Default::default()));
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.a", "A")]);
    let orch = orchestrator(config, reader.clone(), loader, notifier);
    let report = orch.run().await;

    assert!(!report.all_succeeded());
    // 1 initial attempt + connect_retries (3)
    assert_eq!(reader.open_calls("dbo.a"), 4);
    assert_eq!(
        report.results[0].error_kind.as_deref(),
        Some("source_unavailable")
    );
}

#[tokio::test]
async fn non_connection_errors_are_not_retried() {
    let reader = Arc::new(FakeReader::default().with_open_failures(
        "dbo.a",
        vec![TransferError::schema_mismatch(
            "dbo.a -> A",
            "column MISSING not found",
        )],
    ));
    let loader = Arc::new(FakeLoader::atomic(Default::default()));
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.a", "A")]);
    let orch = orchestrator(config, reader.clone(), loader, notifier);
    let report = orch.run().await;

    assert_eq!(reader.open_calls("dbo.a"), 1);
    assert_eq!(
        report.results[0].error_kind.as_deref(),
        Some("schema_mismatch")
    );
}

#[tokio::test]
async fn target_connect_failures_also_retry() {
    let storage: Storage = Default::default();
    let reader = Arc::new(
        FakeReader::default().with_table("dbo.a", vec![vec![record(1, Some("x"))]]),
    );
    let loader = Arc::new(
        FakeLoader::atomic(storage)
            .with_begin_failures(
                "A",
                vec![TransferError::target_unavailable("timeout", "connect")],
            ),
    );
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.a", "A")]);
    let orch = orchestrator(config, reader, loader.clone(), notifier);
    let report = orch.run().await;

    assert!(report.all_succeeded());
    assert_eq!(loader.begin_calls("A"), 2);
}

#[tokio::test]
async fn cancelled_run_records_every_mapping_and_still_notifies() {
    let reader = Arc::new(
        FakeReader::default()
            .with_table("dbo.a", vec![vec![record(1, Some("x"))]])
            .with_table("dbo.b", vec![vec![record(2, Some("y"))]]),
    );
    let loader = Arc::new(FakeLoader::atomic(Default::default()));
    let notifier = Arc::new(FakeNotifier::default());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let config = test_config(vec![mapping("dbo.a", "A"), mapping("dbo.b", "B")]);
    let report = Orchestrator::new(config, reader, loader, notifier.clone(), cancel)
        .run()
        .await;

    assert_eq!(report.results.len(), 2);
    for result in &report.results {
        assert_eq!(result.error_kind.as_deref(), Some("cancelled"));
    }
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn schema_mismatch_on_first_mapping_still_runs_the_second() {
    let storage: Storage = Default::default();
    let reader = Arc::new(
        FakeReader::default()
            .with_open_failures(
                "dbo.a",
                vec![TransferError::schema_mismatch(
                    "dbo.a -> A",
                    "column MISSING not found in source",
                )],
            )
            .with_table("dbo.b", vec![vec![record(1, Some("x"))]]),
    );
    let loader = Arc::new(FakeLoader::atomic(storage));
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.a", "A"), mapping("dbo.b", "B")]);
    let report = orchestrator(config, reader, loader, notifier.clone())
        .run()
        .await;

    assert_eq!(report.results.len(), 2);
    assert!(!report.results[0].is_success());
    assert_eq!(
        report.results[0].error_kind.as_deref(),
        Some("schema_mismatch")
    );
    assert!(report.results[1].is_success());
    assert!(!report.all_succeeded());
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn notifier_is_called_exactly_once_with_the_final_report() {
    let reader = Arc::new(
        FakeReader::default().with_table("dbo.a", vec![vec![record(1, Some("x"))]]),
    );
    let loader = Arc::new(FakeLoader::atomic(Default::default()));
    let notifier = Arc::new(FakeNotifier::default());

    let config = test_config(vec![mapping("dbo.a", "A")]);
    let report = orchestrator(config, reader, loader, notifier.clone())
        .run()
        .await;

    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    let seen = notifier.last.lock().unwrap().clone().unwrap();
    assert_eq!(seen.results.len(), report.results.len());
    assert_eq!(seen.total_rows(), 1);
}

#[tokio::test]
async fn notification_failure_does_not_fail_the_run() {
    let reader = Arc::new(
        FakeReader::default().with_table("dbo.a", vec![vec![record(1, Some("x"))]]),
    );
    let loader = Arc::new(FakeLoader::atomic(Default::default()));
    let notifier = Arc::new(FakeNotifier {
        fail: true,
        ..Default::default()
    });

    let config = test_config(vec![mapping("dbo.a", "A")]);
    let report = orchestrator(config, reader, loader, notifier.clone())
        .run()
        .await;

    assert!(report.all_succeeded());
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
}
