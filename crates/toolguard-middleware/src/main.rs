//! toolguard stdin host.
//!
//! Reads one JSON `ToolRequest` per line from stdin, runs it through the
//! guard chain and writes the `Outcome` as one JSON line to stdout. Useful
//! for exercising a policy file by hand:
//!
//! ```text
//! echo '{"caller_id":"alice","operation":"read","arguments":{"path":"a.txt"}}' \
//!   | toolguard-middleware toolguard.yaml
//! ```

use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use toolguard_core::{Outcome, Rejection, ToolRequest};
use toolguard_middleware::{app_state::AppState, config};

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TOOLGUARD_CONFIG").ok())
        .unwrap_or_else(|| "toolguard.yaml".to_string());

    let state = match config::load_from_file(&path).and_then(AppState::new) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(config = %path, error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };
    let _sweeper = state.guard().limiter().spawn_sweeper();

    tracing::info!(config = %path, "toolguard reading requests from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<ToolRequest>(&line) {
            Ok(req) => state.process(req).await,
            Err(e) => Outcome::Rejected(Rejection::error(format!("malformed request: {e}"))),
        };
        let mut out = match serde_json::to_string(&outcome) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "outcome encoding failed");
                continue;
            }
        };
        out.push('\n');
        if stdout.write_all(out.as_bytes()).await.is_err() {
            break;
        }
    }

    let _ = stdout.flush().await;
    state.guard().logger().flush();
    tracing::debug!(metrics = %state.metrics_text(), "final metrics");
    ExitCode::SUCCESS
}
