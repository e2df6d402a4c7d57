//! Diagnostics emitted around the guard chain: argument logging and slow
//! request warnings.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use toolguard_core::{OutcomeCode, RecordTimer, ToolRequest};
use toolguard_middleware::app_state::AppState;
use toolguard_middleware::config;
use toolguard_middleware::obs::{GuardMetrics, RequestLogger};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Routes every event on this thread into a buffer until the guard drops.
fn capture() -> (Captured, tracing::subscriber::DefaultGuard) {
    let out = Captured::default();
    let writer = out.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (out, tracing::subscriber::set_default(subscriber))
}

fn state(log_arguments: bool) -> (tempfile::TempDir, AppState) {
    let tmp = tempfile::tempdir().unwrap();
    let yaml = format!(
        "version: 1\naccess:\n  default: allow\npaths:\n  roots: [\"{}\"]\nlogging:\n  log_arguments: {log_arguments}\n",
        tmp.path().display()
    );
    let st = AppState::new(config::load_from_str(&yaml).unwrap()).unwrap();
    (tmp, st)
}

fn search() -> ToolRequest {
    ToolRequest::bare("alice", "search").with_arg("query", "hunter2")
}

#[tokio::test]
async fn arguments_are_logged_only_when_enabled() {
    let (_tmp, st) = state(true);
    let (out, _guard) = capture();
    assert!(st.process(search()).await.is_allowed());
    let text = out.text();
    assert!(text.contains("request arguments"), "{text}");
    assert!(text.contains("hunter2"), "{text}");
}

#[tokio::test]
async fn arguments_stay_out_of_logs_by_default() {
    let (_tmp, st) = state(false);
    let (out, _guard) = capture();
    assert!(st.process(search()).await.is_allowed());
    let text = out.text();
    assert!(text.contains("alice"), "audit event still emitted: {text}");
    assert!(!text.contains("hunter2"), "{text}");
}

#[test]
fn slow_requests_are_flagged() {
    let (out, _guard) = capture();
    let logger = RequestLogger::new(Arc::new(GuardMetrics::default()), Duration::from_millis(3), 8);

    logger.record(RecordTimer::start("alice", "quick").finish(OutcomeCode::Allowed, None));
    let timer = RecordTimer::start("alice", "crawl");
    std::thread::sleep(Duration::from_millis(20));
    logger.record(timer.finish(OutcomeCode::Allowed, None));

    let warnings: Vec<String> = out
        .text()
        .lines()
        .filter(|l| l.contains("slow request"))
        .map(str::to_string)
        .collect();
    assert_eq!(warnings.len(), 1, "{warnings:?}");
    assert!(warnings[0].contains("crawl"));
}
