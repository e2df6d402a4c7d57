//! Request logger and record sinks.
//!
//! `RequestLogger::record` is fire-and-forget: a failing or panicking sink
//! is counted, reported through `tracing`, and replaced by the fallback sink
//! for that record. Nothing here can fail the request.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};

use toolguard_core::error::{Result, ToolGuardError};
use toolguard_core::RequestRecord;

use super::metrics::GuardMetrics;

/// Destination for finalized records.
pub trait RecordSink: Send + Sync {
    /// Label used in metrics and diagnostics.
    fn name(&self) -> &'static str;

    fn write(&self, record: &RequestRecord) -> io::Result<()>;

    /// Sinks without internal buffering keep the default.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Emits each record as a structured `tracing` event. Never fails, so it
/// doubles as the fallback sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn write(&self, r: &RequestRecord) -> io::Result<()> {
        tracing::info!(
            target: "toolguard::audit",
            caller = %r.caller_id(),
            operation = %r.operation(),
            outcome = r.outcome().as_str(),
            elapsed_us = u64::try_from(r.elapsed().as_micros()).unwrap_or(u64::MAX),
            detail = r.detail().unwrap_or(""),
            "request"
        );
        Ok(())
    }
}

/// Queue depth used by [`JsonLinesSink::open`].
pub const AUDIT_QUEUE_CAPACITY: usize = 4096;

const FLUSH_WAIT: Duration = Duration::from_secs(5);

/// Append-only JSON-lines audit file, one record per line.
///
/// `write` only serializes and enqueues; file I/O happens on a dedicated
/// writer thread, so a slow disk never stalls the async workers running the
/// guard chain. A full queue is reported as a write failure.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    tx: mpsc::Sender<String>,
    pending: Arc<AtomicUsize>,
}

impl JsonLinesSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_queue(path, AUDIT_QUEUE_CAPACITY)
    }

    pub fn with_queue(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ToolGuardError::Config(format!("audit log directory {}: {e}", parent.display()))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ToolGuardError::Config(format!("audit log {}: {e}", path.display())))?;

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));
        let writer = AuditWriter {
            path: path.clone(),
            out: BufWriter::new(file),
            rx,
            pending: Arc::clone(&pending),
        };
        std::thread::Builder::new()
            .name("toolguard-audit".into())
            .spawn(move || writer.run())
            .map_err(|e| ToolGuardError::Config(format!("audit writer thread: {e}")))?;

        Ok(Self { path, tx, pending })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records accepted but not yet flushed to disk.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl RecordSink for JsonLinesSink {
    fn name(&self) -> &'static str {
        "json_lines"
    }

    fn write(&self, record: &RequestRecord) -> io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.try_send(line).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            match e {
                TrySendError::Full(_) => io::Error::new(io::ErrorKind::WouldBlock, "audit queue full"),
                TrySendError::Closed(_) => {
                    io::Error::new(io::ErrorKind::BrokenPipe, "audit writer stopped")
                }
            }
        })
    }

    /// Waits until the writer thread has flushed everything queued so far.
    fn flush(&self) -> io::Result<()> {
        let deadline = Instant::now() + FLUSH_WAIT;
        while self.pending() > 0 {
            if Instant::now() >= deadline {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "audit queue did not drain"));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

struct AuditWriter {
    path: PathBuf,
    out: BufWriter<File>,
    rx: mpsc::Receiver<String>,
    pending: Arc<AtomicUsize>,
}

impl AuditWriter {
    // Runs on its own OS thread; exits once every sender is dropped.
    fn run(mut self) {
        while let Some(line) = self.rx.blocking_recv() {
            self.append(&line);
            let mut done = 1usize;
            while let Ok(line) = self.rx.try_recv() {
                self.append(&line);
                done += 1;
            }
            if let Err(e) = self.out.flush() {
                tracing::warn!(path = %self.path.display(), error = %e, "audit log flush failed");
            }
            self.pending.fetch_sub(done, Ordering::AcqRel);
        }
        let _ = self.out.flush();
    }

    fn append(&mut self, line: &str) {
        if let Err(e) = self.out.write_all(line.as_bytes()) {
            tracing::warn!(
                target: "toolguard::audit",
                path = %self.path.display(),
                error = %e,
                record = line.trim_end(),
                "audit log write failed"
            );
        }
    }
}

/// Bounded in-memory ring of recent records, exposed to reporting
/// collaborators as a sequence. Oldest records are dropped first.
#[derive(Debug)]
pub struct RecordBuffer {
    capacity: usize,
    inner: Mutex<VecDeque<RequestRecord>>,
}

impl RecordBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    fn push(&self, record: RequestRecord) {
        let mut q = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if q.len() == self.capacity {
            q.pop_front();
        }
        q.push_back(record);
    }

    /// Take every buffered record, oldest first.
    pub fn drain(&self) -> Vec<RequestRecord> {
        let mut q = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        q.drain(..).collect()
    }

    /// Copy of the buffered records, oldest first.
    pub fn snapshot(&self) -> Vec<RequestRecord> {
        let q = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        q.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RequestLogger {
    sinks: Vec<Arc<dyn RecordSink>>,
    fallback: TracingSink,
    buffer: Arc<RecordBuffer>,
    metrics: Arc<GuardMetrics>,
    slow_threshold: Duration,
}

impl RequestLogger {
    pub fn new(metrics: Arc<GuardMetrics>, slow_threshold: Duration, buffer_capacity: usize) -> Self {
        Self {
            sinks: Vec::new(),
            fallback: TracingSink,
            buffer: Arc::new(RecordBuffer::new(buffer_capacity)),
            metrics,
            slow_threshold,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Recent records for reporting/metrics consumers.
    pub fn records(&self) -> Arc<RecordBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Record a finalized request. Takes ownership; the record ends up in
    /// the buffer after every sink has seen it.
    pub fn record(&self, record: RequestRecord) {
        let outcome = record.outcome().as_str();
        self.metrics
            .decisions
            .inc(&[("outcome", outcome)]);
        self.metrics
            .request_duration
            .observe(&[("outcome", outcome)], record.elapsed());

        if record.elapsed() > self.slow_threshold {
            tracing::warn!(
                caller = %record.caller_id(),
                operation = %record.operation(),
                elapsed_ms = u64::try_from(record.elapsed().as_millis()).unwrap_or(u64::MAX),
                "slow request"
            );
        }

        let mut fell_back = false;
        for sink in &self.sinks {
            let res = panic::catch_unwind(AssertUnwindSafe(|| sink.write(&record)));
            let err = match res {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => "sink panicked".to_string(),
            };
            self.metrics.sink_failures.inc(&[("sink", sink.name())]);
            tracing::warn!(sink = sink.name(), error = %err, "record sink failed; using fallback");
            if !fell_back {
                let _ = self.fallback.write(&record);
                fell_back = true;
            }
        }
        if self.sinks.is_empty() {
            let _ = self.fallback.write(&record);
        }

        self.buffer.push(record);
    }

    pub fn flush(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                tracing::warn!(sink = sink.name(), error = %e, "record sink flush failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolguard_core::{OutcomeCode, RecordTimer};

    struct FailingSink;
    impl RecordSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn write(&self, _: &RequestRecord) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    struct PanickingSink;
    impl RecordSink for PanickingSink {
        fn name(&self) -> &'static str {
            "panicking"
        }
        fn write(&self, _: &RequestRecord) -> io::Result<()> {
            panic!("sink bug")
        }
    }

    fn rec(op: &str) -> RequestRecord {
        RecordTimer::start("alice", op).finish(OutcomeCode::Allowed, None)
    }

    #[test]
    fn sink_failures_never_escape() {
        let metrics = Arc::new(GuardMetrics::default());
        let logger = RequestLogger::new(Arc::clone(&metrics), Duration::from_secs(5), 8)
            .with_sink(Arc::new(FailingSink))
            .with_sink(Arc::new(PanickingSink));
        logger.record(rec("read"));

        assert_eq!(metrics.sink_failures.get(&[("sink", "failing")]), 1);
        assert_eq!(metrics.sink_failures.get(&[("sink", "panicking")]), 1);
        assert_eq!(logger.records().len(), 1);
    }

    #[test]
    fn buffer_is_bounded_and_ordered() {
        let logger = RequestLogger::new(Arc::new(GuardMetrics::default()), Duration::from_secs(5), 2);
        logger.record(rec("a"));
        logger.record(rec("b"));
        logger.record(rec("c"));
        let ops: Vec<String> = logger
            .records()
            .drain()
            .iter()
            .map(|r| r.operation().to_string())
            .collect();
        assert_eq!(ops, vec!["b", "c"]);
        assert!(logger.records().is_empty());
    }

    #[test]
    fn json_lines_sink_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("audit/requests.jsonl");
        let sink = Arc::new(JsonLinesSink::open(&path).unwrap());
        let logger = RequestLogger::new(Arc::new(GuardMetrics::default()), Duration::from_secs(5), 4)
            .with_sink(sink);
        logger.record(rec("read"));
        logger.record(rec("write"));
        logger.flush();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["operation"], "write");
        assert_eq!(lines[0]["outcome"], "allowed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn json_lines_sink_accepts_concurrent_writers() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("requests.jsonl");
        let sink = Arc::new(JsonLinesSink::open(&path).unwrap());
        let logger = Arc::new(
            RequestLogger::new(Arc::new(GuardMetrics::default()), Duration::from_secs(5), 4)
                .with_sink(Arc::clone(&sink) as Arc<dyn RecordSink>),
        );

        let mut handles = Vec::new();
        for i in 0..8 {
            let logger = Arc::clone(&logger);
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    logger.record(rec(&format!("op{i}")));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        logger.flush();

        assert_eq!(sink.pending(), 0);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 200);
    }

    #[test]
    fn full_audit_queue_falls_back_without_failing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("requests.jsonl");
        let metrics = Arc::new(GuardMetrics::default());
        let sink = Arc::new(JsonLinesSink::with_queue(&path, 1).unwrap());
        let logger = RequestLogger::new(Arc::clone(&metrics), Duration::from_secs(5), 1024)
            .with_sink(Arc::clone(&sink) as Arc<dyn RecordSink>);

        for _ in 0..500 {
            logger.record(rec("read"));
        }
        logger.flush();

        // every record reaches the buffer; the file holds the rest
        assert_eq!(logger.records().len(), 500);
        let dropped = metrics.sink_failures.get(&[("sink", "json_lines")]);
        let written = std::fs::read_to_string(&path).unwrap().lines().count() as u64;
        assert_eq!(written + dropped, 500);
    }
}
