// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The core application logic that drives one export run.
//!
//! The Orchestrator walks the pipeline `Configuring → Connecting →
//! Extracting+Serializing → Uploading` and ends in exactly one terminal state.
//! It owns the retry policy for uploads; adapters never retry on their own.

use crate::application::runtime::Watchdog;
use crate::config::{Destination, RunConfig, Settings, UploadSettings};
use crate::domain::cancellation::CancellationToken;
use crate::domain::entities::{PipelineState, RunReport, SerializedArtifact, UploadReceipt};
use crate::domain::errors::{ExportError, Result};
use crate::domain::row_stream::RowStream;
use crate::infrastructure::local_storage::delimited_serializer::DelimitedSerializer;
use crate::ports::database_port::DatabasePort;
use crate::ports::storage_port::StoragePort;
use chrono::Utc;
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Orchestrates the end-to-end export of one MySQL table to one S3 object.
pub struct Orchestrator {
    database: Arc<dyn DatabasePort>,
    storage: Arc<dyn StoragePort>,
    serializer: DelimitedSerializer,
    cancel: CancellationToken,
}

/// Mutable bookkeeping for a single run.
struct RunState {
    report: RunReport,
    /// Artifact produced by this run that must be deleted at the end.
    remove_on_exit: Option<PathBuf>,
}

impl RunState {
    fn advance(&mut self, next: PipelineState) {
        if self.report.state.can_advance_to(next) {
            info!("State: {} -> {}", self.report.state, next);
            self.report.state = next;
        } else {
            warn!(
                "Ignoring backwards transition {} -> {}",
                self.report.state, next
            );
        }
    }
}

impl Orchestrator {
    pub fn new(
        database: Arc<dyn DatabasePort>,
        storage: Arc<dyn StoragePort>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            database,
            storage,
            serializer: DelimitedSerializer::new(),
            cancel,
        }
    }

    /// Runs the whole pipeline and returns its report. Never panics on a
    /// pipeline failure: the failure is recorded in the report instead.
    pub fn run(&self, settings: &Settings) -> RunReport {
        let start_time = Instant::now();
        let mut state = RunState {
            report: RunReport::new(Utc::now()),
            remove_on_exit: None,
        };
        info!("Starting export run...");

        match self.execute(settings, &mut state) {
            Ok(()) => state.advance(PipelineState::Succeeded),
            Err(e) => {
                let kind = e.kind();
                error!("Run failed ({}): {}", kind, e);
                state.report.failure_kind = Some(kind);
                state.report.error = Some(e.to_string());
                state.advance(PipelineState::Failed(kind));
            }
        }

        if let Some(path) = state.remove_on_exit.take() {
            match fs::remove_file(&path) {
                Ok(()) => info!("Removed local artifact {}", path.display()),
                Err(e) => warn!("Could not remove {}: {}", path.display(), e),
            }
        }

        let mut report = state.report;
        report.duration_secs = start_time.elapsed().as_secs_f64();

        if let Some(path) = report_path(settings) {
            if let Err(e) = write_report(&report, &path) {
                warn!("Could not write run report to {}: {}", path.display(), e);
            } else {
                info!("Run report written to {}", path.display());
            }
        }

        report
    }

    fn execute(&self, settings: &Settings, state: &mut RunState) -> Result<()> {
        state.advance(PipelineState::Configuring);
        self.cancel.check()?;
        let config = RunConfig::load(settings)?;
        let table = config.export.table.clone();
        state.report.table = Some(table.clone());
        state.report.bucket = Some(config.destination.bucket.clone());
        state.report.key = Some(config.destination.key.clone());

        let _watchdog = config
            .export
            .run_timeout
            .map(|limit| Watchdog::start(self.cancel.clone(), limit));

        state.advance(PipelineState::Connecting);
        self.cancel.check()?;

        let mut session = self.database.open(&config.database)?;

        state.advance(PipelineState::Extracting);
        self.cancel.check()?;

        if let Some(rows) = config.export.seed_mock_rows {
            let inserted = session.seed_if_empty(&table, rows)?;
            if inserted > 0 {
                info!("Seeded {} mock rows into {}", inserted, table);
            }
        }

        let stream = session.extract(&table, config.export.fetch_batch_size)?;
        let artifact = self
            .serializer
            .serialize(self.cancellable(stream), &config.export.output_path)?;
        // Release the connection before any upload starts.
        drop(session);

        if config.export.remove_artifact {
            state.remove_on_exit = Some(artifact.path.clone());
        }
        state.report.rows = artifact.rows;
        state.report.bytes = artifact.bytes;
        state.report.sha256 = Some(artifact.sha256_hex());

        state.advance(PipelineState::Uploading);
        let receipt = self.upload_with_retry(
            &artifact,
            &config.destination,
            &config.upload,
            &mut state.report,
        )?;
        state.report.e_tag = receipt.e_tag.clone();

        info!(
            "Exported {} rows ({} bytes) from {} to s3://{}/{} in {} attempt(s)",
            artifact.rows, artifact.bytes, table, receipt.bucket, receipt.key, receipt.attempts
        );
        Ok(())
    }

    /// Makes the row stream fail with `Cancelled` as soon as cancellation is
    /// requested.
    fn cancellable<'a>(&self, stream: RowStream<'a>) -> RowStream<'a> {
        let cancel = self.cancel.clone();
        let RowStream { schema, rows } = stream;
        RowStream::new(schema, rows.map(move |row| cancel.check().and(row)))
    }

    /// Uploads with bounded exponential backoff. Only transient transfer
    /// errors are retried.
    fn upload_with_retry(
        &self,
        artifact: &SerializedArtifact,
        destination: &Destination,
        settings: &UploadSettings,
        report: &mut RunReport,
    ) -> Result<UploadReceipt> {
        let policy = settings.retry;
        let mut attempts = 0;
        loop {
            self.cancel.check()?;
            attempts += 1;
            report.attempts = attempts;

            match self
                .storage
                .upload(artifact, destination, settings, &self.cancel)
            {
                Ok(mut receipt) => {
                    receipt.attempts = attempts;
                    return Ok(receipt);
                }
                Err(e) if e.is_retryable() && policy.has_attempts_left(attempts) => {
                    let delay = policy.backoff_for(attempts);
                    warn!(
                        "Upload attempt {}/{} failed: {}. Retrying in {:?}",
                        attempts, policy.max_attempts, e, delay
                    );
                    self.cancel.sleep(delay)?;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!("Upload failed after {} attempts", attempts);
                    }
                    return Err(e);
                }
            }
        }
    }
}

fn report_path(settings: &Settings) -> Option<PathBuf> {
    settings
        .get("REPORT_PATH")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let io_err = |e: std::io::Error| ExportError::Serialization(format!("{}: {}", path.display(), e));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = fs::File::create(path).map_err(io_err)?;
    serde_json::to_writer_pretty(file, report)
        .map_err(|e| ExportError::Serialization(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use crate::domain::entities::{Row, TableSchema};
    use crate::domain::errors::FailureKind;
    use crate::ports::database_port::DatabaseSession;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct MockDatabase {
        columns: Vec<String>,
        rows: Vec<Row>,
        fail_after: Option<usize>,
        cancel_after: Option<(usize, CancellationToken)>,
        pulled: Arc<AtomicUsize>,
        refuse_connection: bool,
        opened: AtomicU32,
        closed: Arc<AtomicBool>,
    }

    impl MockDatabase {
        fn with_rows(columns: &[&str], rows: Vec<Row>) -> Self {
            Self {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
                fail_after: None,
                cancel_after: None,
                pulled: Arc::new(AtomicUsize::new(0)),
                refuse_connection: false,
                opened: AtomicU32::new(0),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }

        fn mi_tabla() -> Self {
            Self::with_rows(
                &["id", "name"],
                vec![
                    Row::new(vec![Some("1".into()), Some("a".into())]),
                    Row::new(vec![Some("2".into()), Some("b,c".into())]),
                ],
            )
        }
    }

    struct MockSession {
        columns: Vec<String>,
        rows: Vec<Row>,
        fail_after: Option<usize>,
        cancel_after: Option<(usize, CancellationToken)>,
        pulled: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
    }

    impl Drop for MockSession {
        fn drop(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl DatabasePort for MockDatabase {
        fn open(&self, _settings: &DatabaseSettings) -> Result<Box<dyn DatabaseSession>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            if self.refuse_connection {
                return Err(ExportError::Connection("access denied".into()));
            }
            Ok(Box::new(MockSession {
                columns: self.columns.clone(),
                rows: self.rows.clone(),
                fail_after: self.fail_after,
                cancel_after: self.cancel_after.clone(),
                pulled: self.pulled.clone(),
                closed: self.closed.clone(),
            }))
        }
    }

    impl DatabaseSession for MockSession {
        fn seed_if_empty(&mut self, _table: &str, rows: u32) -> Result<u64> {
            if !self.rows.is_empty() {
                return Ok(0);
            }
            self.rows = (1..=rows)
                .map(|i| Row::new(vec![Some(i.to_string()), Some(format!("mock_name_{}", i))]))
                .collect();
            Ok(u64::from(rows))
        }

        fn extract(&mut self, table: &str, batch_size: usize) -> Result<RowStream<'_>> {
            let schema = TableSchema {
                table: table.to_string(),
                columns: self.columns.clone(),
            };
            let mut items: Vec<Result<Row>> = self.rows.iter().cloned().map(Ok).collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(ExportError::extraction(table, "Lost connection to MySQL server")));
            }
            let pulled = self.pulled.clone();
            let cancel_after = self.cancel_after.clone();
            let cursor = items.into_iter().enumerate().map(move |(i, item)| {
                pulled.fetch_add(1, Ordering::SeqCst);
                if let Some((k, token)) = &cancel_after {
                    if i + 1 == *k {
                        token.cancel("interrupted by signal");
                    }
                }
                item
            });
            Ok(RowStream::batched(schema, cursor, batch_size))
        }
    }

    #[derive(Default)]
    struct MockStorage {
        failures: Mutex<VecDeque<ExportError>>,
        calls: AtomicU32,
        uploaded: Mutex<Option<Vec<u8>>>,
    }

    impl MockStorage {
        fn failing_with(errors: Vec<ExportError>) -> Self {
            Self {
                failures: Mutex::new(errors.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn uploaded(&self) -> Option<String> {
            self.uploaded
                .lock()
                .unwrap()
                .clone()
                .map(|b| String::from_utf8(b).unwrap())
        }
    }

    impl StoragePort for MockStorage {
        fn upload(
            &self,
            artifact: &SerializedArtifact,
            destination: &Destination,
            _settings: &UploadSettings,
            _cancel: &CancellationToken,
        ) -> Result<UploadReceipt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.failures.lock().unwrap().pop_front() {
                return Err(e);
            }
            *self.uploaded.lock().unwrap() = Some(fs::read(&artifact.path).unwrap());
            Ok(UploadReceipt {
                bucket: destination.bucket.clone(),
                key: destination.key.clone(),
                e_tag: Some("\"etag\"".into()),
                bytes: artifact.bytes,
                attempts: 1,
            })
        }
    }

    fn settings(dir: &TempDir) -> Settings {
        let mut s = Settings::new();
        s.set(MYSQL_HOST, "localhost");
        s.set(MYSQL_PORT, "3306");
        s.set(MYSQL_USER, "exporter");
        s.set(MYSQL_PASSWORD, "secret");
        s.set(MYSQL_DATABASE, "ventas");
        s.set(MYSQL_TABLE, "mi_tabla");
        s.set(OUTPUT_CSV, dir.path().join("out.csv").to_string_lossy());
        s.set(S3_BUCKET, "gcr-output-01");
        s.set(S3_OBJECT_KEY, "exports/out.csv");
        s.set(AWS_REGION, "us-east-1");
        s.set("UPLOAD_BACKOFF_MS", "1");
        s.set("UPLOAD_MAX_BACKOFF_MS", "4");
        s
    }

    fn orchestrator(db: &Arc<MockDatabase>, storage: &Arc<MockStorage>) -> Orchestrator {
        Orchestrator::new(db.clone(), storage.clone(), CancellationToken::new())
    }

    #[test]
    fn test_successful_export_of_mi_tabla() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MockDatabase::mi_tabla());
        let storage = Arc::new(MockStorage::default());

        let report = orchestrator(&db, &storage).run(&settings(&dir));

        assert!(report.succeeded(), "{:?}", report.error);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.rows, 2);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.e_tag.as_deref(), Some("\"etag\""));
        assert_eq!(
            storage.uploaded().as_deref(),
            Some("id,name\r\n1,a\r\n2,\"b,c\"\r\n")
        );
        assert!(db.closed.load(Ordering::SeqCst));
        assert!(dir.path().join("out.csv").exists());
    }

    #[test]
    fn test_transient_failures_are_retried_until_success() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MockDatabase::mi_tabla());
        let storage = Arc::new(MockStorage::failing_with(vec![
            ExportError::transient("SlowDown"),
            ExportError::transient("connection reset"),
            ExportError::transient("503"),
        ]));
        let mut s = settings(&dir);
        s.set("UPLOAD_MAX_ATTEMPTS", "4");

        let report = orchestrator(&db, &storage).run(&s);

        assert!(report.succeeded(), "{:?}", report.error);
        assert_eq!(report.attempts, 4);
        assert_eq!(storage.calls(), 4);
    }

    #[test]
    fn test_retries_stop_at_max_attempts() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MockDatabase::mi_tabla());
        let storage = Arc::new(MockStorage::failing_with(
            (0..5).map(|_| ExportError::transient("SlowDown")).collect(),
        ));
        let mut s = settings(&dir);
        s.set("UPLOAD_MAX_ATTEMPTS", "3");

        let report = orchestrator(&db, &storage).run(&s);

        assert_eq!(report.state, PipelineState::Failed(FailureKind::Transfer));
        assert_eq!(report.attempts, 3);
        assert_eq!(storage.calls(), 3);
        assert_eq!(report.exit_code(), 6);
    }

    #[test]
    fn test_fatal_transfer_error_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MockDatabase::mi_tabla());
        let storage = Arc::new(MockStorage::failing_with(vec![
            ExportError::fatal_transfer("AccessDenied"),
        ]));

        let report = orchestrator(&db, &storage).run(&settings(&dir));

        assert_eq!(report.state, PipelineState::Failed(FailureKind::Transfer));
        assert_eq!(storage.calls(), 1);
        assert_eq!(report.attempts, 1);
    }

    #[test]
    fn test_extraction_error_skips_upload_and_closes_connection() {
        let dir = TempDir::new().unwrap();
        let mut db = MockDatabase::mi_tabla();
        db.fail_after = Some(1);
        let db = Arc::new(db);
        let storage = Arc::new(MockStorage::default());

        let report = orchestrator(&db, &storage).run(&settings(&dir));

        assert_eq!(report.state, PipelineState::Failed(FailureKind::Extraction));
        assert_eq!(report.exit_code(), 4);
        assert_eq!(storage.calls(), 0);
        assert!(db.closed.load(Ordering::SeqCst));
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn test_missing_setting_never_opens_database() {
        let db = Arc::new(MockDatabase::mi_tabla());
        let storage = Arc::new(MockStorage::default());
        let mut s = Settings::new();
        for (key, value) in [(MYSQL_HOST, "localhost"), (MYSQL_PORT, "3306")] {
            s.set(key, value);
        }

        let report = orchestrator(&db, &storage).run(&s);

        assert_eq!(
            report.state,
            PipelineState::Failed(FailureKind::Configuration)
        );
        assert_eq!(report.exit_code(), 2);
        assert_eq!(db.opened.load(Ordering::SeqCst), 0);
        assert!(report.error.unwrap().contains(MYSQL_USER));
    }

    #[test]
    fn test_connection_failure() {
        let dir = TempDir::new().unwrap();
        let mut db = MockDatabase::mi_tabla();
        db.refuse_connection = true;
        let db = Arc::new(db);
        let storage = Arc::new(MockStorage::default());

        let report = orchestrator(&db, &storage).run(&settings(&dir));

        assert_eq!(report.state, PipelineState::Failed(FailureKind::Connection));
        assert_eq!(report.exit_code(), 3);
        assert_eq!(storage.calls(), 0);
    }

    #[test]
    fn test_empty_table_uploads_header_only() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MockDatabase::with_rows(&["id", "name"], vec![]));
        let storage = Arc::new(MockStorage::default());

        let report = orchestrator(&db, &storage).run(&settings(&dir));

        assert!(report.succeeded(), "{:?}", report.error);
        assert_eq!(report.rows, 0);
        assert_eq!(storage.uploaded().as_deref(), Some("id,name\r\n"));
    }

    #[test]
    fn test_seeding_fills_empty_table_before_export() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MockDatabase::with_rows(&["id", "name"], vec![]));
        let storage = Arc::new(MockStorage::default());
        let mut s = settings(&dir);
        s.set("SEED_MOCK_DATA", "true");

        let report = orchestrator(&db, &storage).run(&s);

        assert!(report.succeeded(), "{:?}", report.error);
        assert_eq!(report.rows, 3);
        assert_eq!(
            storage.uploaded().as_deref(),
            Some("id,name\r\n1,mock_name_1\r\n2,mock_name_2\r\n3,mock_name_3\r\n")
        );
    }

    #[test]
    fn test_cancelled_run_reports_cancelled() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MockDatabase::mi_tabla());
        let storage = Arc::new(MockStorage::default());
        let cancel = CancellationToken::new();
        cancel.cancel("interrupted by signal");

        let report = Orchestrator::new(db.clone(), storage.clone(), cancel).run(&settings(&dir));

        assert_eq!(report.state, PipelineState::Failed(FailureKind::Cancelled));
        assert_eq!(report.exit_code(), 130);
        assert_eq!(db.opened.load(Ordering::SeqCst), 0);
        assert_eq!(storage.calls(), 0);
    }

    #[test]
    fn test_cancel_between_rows_stops_extraction() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let rows = (1..=1000)
            .map(|i| Row::new(vec![Some(i.to_string()), Some("x".into())]))
            .collect();
        let mut db = MockDatabase::with_rows(&["id", "name"], rows);
        db.cancel_after = Some((25, cancel.clone()));
        let db = Arc::new(db);
        let storage = Arc::new(MockStorage::default());
        let mut s = settings(&dir);
        s.set("FETCH_BATCH_SIZE", "10");

        let report = Orchestrator::new(db.clone(), storage.clone(), cancel).run(&s);

        assert_eq!(report.state, PipelineState::Failed(FailureKind::Cancelled));
        assert_eq!(report.exit_code(), 130);
        assert!(db.closed.load(Ordering::SeqCst));
        assert_eq!(db.pulled.load(Ordering::SeqCst), 30);
        assert_eq!(storage.calls(), 0);
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn test_remove_artifact_after_success() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MockDatabase::mi_tabla());
        let storage = Arc::new(MockStorage::default());
        let mut s = settings(&dir);
        s.set("REMOVE_ARTIFACT", "true");

        let report = orchestrator(&db, &storage).run(&s);

        assert!(report.succeeded());
        assert!(storage.uploaded().is_some());
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn test_report_written_on_failure() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(MockDatabase::mi_tabla());
        let storage = Arc::new(MockStorage::failing_with(vec![
            ExportError::fatal_transfer("NoSuchBucket"),
        ]));
        let report_file = dir.path().join("reports").join("run.json");
        let mut s = settings(&dir);
        s.set("REPORT_PATH", report_file.to_string_lossy());

        orchestrator(&db, &storage).run(&s);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report_file).unwrap()).unwrap();
        assert_eq!(json["state"]["FAILED"], "TRANSFER");
        assert_eq!(json["failure_kind"], "TRANSFER");
        assert_eq!(json["table"], "mi_tabla");
        assert_eq!(json["rows"], 2);
        assert_eq!(json["attempts"], 1);
    }
}
