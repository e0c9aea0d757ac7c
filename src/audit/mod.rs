//! Audit logging
//!
//! Every invocation leaves exactly one self-contained JSON line in an
//! append-only sink. Lines carry a SHA-256 digest so a trail can be
//! checked for tampering and replayed later.

mod redact;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, warn};

use crate::error::GatewayError;
use crate::models::AuditRecord;
use crate::Result;

pub use redact::{summarize_arguments, OMITTED_KEYS, REDACTED};

/// Durable destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record. Must be atomic with respect to concurrent appends.
    async fn append(&self, record: &AuditRecord) -> Result<()>;
}

//
// ================= JSONL file sink =================
//

/// Appends one JSON document per line to a file. A single writer lock
/// serializes appends; each line is written with one `write_all` and synced
/// before the lock is released.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        Ok(file)
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }

        let written = match guard.as_mut() {
            Some(file) => write_line(file, &line).await,
            None => Err(GatewayError::AuditWriteFailure("audit file not open".into())),
        };

        if written.is_err() {
            // Reopen on the next attempt.
            *guard = None;
        }
        written
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

//
// ================= In-memory sink =================
//

/// Keeps records in memory.
pub struct MemoryAuditSink {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

//
// ================= Logger =================
//

/// Front door to the sink: seals each record with its digest, retries a
/// failed append once, and counts records that could not be written.
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    failures: AtomicU64,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            failures: AtomicU64::new(0),
        }
    }

    pub async fn record(&self, mut record: AuditRecord) -> Result<()> {
        seal(&mut record);

        let first = match self.sink.append(&record).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        warn!(
            invocation_id = record.invocation_id,
            error = %first,
            "Audit append failed, retrying once"
        );

        match self.sink.append(&record).await {
            Ok(()) => Ok(()),
            Err(second) => {
                let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    invocation_id = record.invocation_id,
                    action = %record.action,
                    error = %second,
                    audit_write_failures = total,
                    "Audit record could not be written"
                );
                Err(GatewayError::AuditWriteFailure(second.to_string()))
            }
        }
    }

    /// Number of records lost after the retry was exhausted.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

//
// ================= Integrity =================
//

/// SHA-256 over the record's JSON form with the digest field cleared.
/// Streams the serialization straight into the hasher.
pub fn compute_record_digest(record: &AuditRecord) -> String {
    let mut unsealed = record.clone();
    unsealed.digest = None;

    let mut hasher = Sha256::new();
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &unsealed).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

fn seal(record: &mut AuditRecord) {
    record.digest = Some(compute_record_digest(record));
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// True when `line` parses as a record whose digest matches its content.
pub fn verify_line(line: &str) -> bool {
    match serde_json::from_str::<AuditRecord>(line) {
        Ok(record) => match record.digest.as_deref() {
            Some(digest) => digest == compute_record_digest(&record),
            None => false,
        },
        Err(_) => false,
    }
}

/// Read a JSONL trail back for replay or inspection. Blank lines are skipped.
pub async fn read_records(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>> {
    let contents = fs::read_to_string(path).await?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(GatewayError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvocationState, Origin};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio_test::{assert_err, assert_ok};

    fn sample(invocation_id: u64) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            invocation_id,
            origin: Origin::Tool,
            action: "get_summary".to_string(),
            arguments: json!({"session_id": invocation_id, "note": "x".repeat(40)}),
            success: true,
            state: InvocationState::Dispatched,
            error: None,
            digest: None,
        }
    }

    /// Fails the first `failures` appends.
    struct FlakySink {
        failures: usize,
        attempts: AtomicUsize,
        inner: MemoryAuditSink,
    }

    impl FlakySink {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                attempts: AtomicUsize::new(0),
                inner: MemoryAuditSink::new(),
            }
        }
    }

    #[async_trait]
    impl AuditSink for FlakySink {
        async fn append(&self, record: &AuditRecord) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(GatewayError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.append(record).await
        }
    }

    #[tokio::test]
    async fn test_jsonl_sink_writes_one_parseable_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.log");
        let logger = AuditLogger::new(Arc::new(JsonlAuditSink::new(&path)));

        assert_ok!(logger.record(sample(1)).await);
        assert_ok!(logger.record(sample(2)).await);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| verify_line(line)));

        let records = read_records(&path).await.unwrap();
        assert_eq!(records[0].invocation_id, 1);
        assert_eq!(records[1].invocation_id, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let logger = Arc::new(AuditLogger::new(Arc::new(JsonlAuditSink::new(&path))));

        let mut handles = Vec::new();
        for id in 0..64u64 {
            let logger = logger.clone();
            handles.push(tokio::spawn(async move {
                let mut record = sample(id);
                record.arguments = json!({"blob": "y".repeat(4096), "session_id": id});
                logger.record(record).await
            }));
        }
        for handle in handles {
            assert_ok!(handle.await.unwrap());
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut ids: Vec<u64> = contents
            .lines()
            .map(|line| {
                assert!(verify_line(line), "corrupted line: {}", line);
                serde_json::from_str::<AuditRecord>(line).unwrap().invocation_id
            })
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_single_failure_is_retried() {
        let sink = Arc::new(FlakySink::new(1));
        let logger = AuditLogger::new(sink.clone());

        assert_ok!(logger.record(sample(5)).await);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(sink.inner.len().await, 1);
        assert_eq!(logger.failures(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retry_is_counted() {
        let sink = Arc::new(FlakySink::new(usize::MAX));
        let logger = AuditLogger::new(sink.clone());

        let err = assert_err!(logger.record(sample(6)).await);
        assert!(matches!(err, GatewayError::AuditWriteFailure(_)));
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(logger.failures(), 1);

        let _ = logger.record(sample(7)).await;
        assert_eq!(logger.failures(), 2);
    }

    #[test]
    fn test_tampered_line_fails_verification() {
        let mut record = sample(9);
        seal(&mut record);
        let line = serde_json::to_string(&record).unwrap();
        assert!(verify_line(&line));

        let tampered = line.replace("\"success\":true", "\"success\":false");
        assert_ne!(line, tampered);
        assert!(!verify_line(&tampered));
        assert!(!verify_line("{not json"));
    }
}
