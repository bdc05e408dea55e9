//! Observability: tracing init and the JSONL audit trail.
//!
//! Uses [`crate::config::ObservabilityConfig`] for CBA_QUIET, CBA_LOG_LEVEL,
//! CBA_LOG_JSON and CBA_AUDIT_LOG. Audit records never carry secret material.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use tracing_subscriber::{prelude::*, EnvFilter};

static AUDIT_PATH: Mutex<Option<String>> = Mutex::new(None);

/// Initialize tracing. Call once at process startup.
///
/// Logs go to stderr: stdout of the inside process carries the agent's
/// relayed output.
pub fn init_tracing() {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let level = if cfg.quiet {
        "cbactions=warn".to_string()
    } else {
        cfg.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    };
}

fn get_audit_path() -> Option<String> {
    {
        let guard = AUDIT_PATH.lock().ok()?;
        if let Some(ref p) = *guard {
            return Some(p.clone());
        }
    }
    let path = crate::config::ObservabilityConfig::from_env().audit_log.clone()?;
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    {
        let mut guard = AUDIT_PATH.lock().ok()?;
        *guard = Some(path.clone());
    }
    Some(path)
}

fn append_jsonl(path: &str, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

fn emit(record: serde_json::Value) {
    if let Some(path) = get_audit_path() {
        append_jsonl(&path, &record);
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Audit: crossing state machine entered `stage`
pub fn audit_crossing_stage(crossing_id: &str, side: &str, stage: &str) {
    emit(json!({
        "ts": now(),
        "event": "crossing_stage",
        "crossing_id": crossing_id,
        "side": side,
        "stage": stage,
    }));
}

/// Audit: agent process spawned
pub fn audit_agent_started(crossing_id: &str, program: &str, pid: u32) {
    emit(json!({
        "ts": now(),
        "event": "agent_started",
        "crossing_id": crossing_id,
        "program": program,
        "pid": pid,
    }));
}

/// Audit: agent process exited. `exit_code` is `None` when killed by a signal.
pub fn audit_agent_exited(crossing_id: &str, exit_code: Option<i32>, duration_ms: u64) {
    emit(json!({
        "ts": now(),
        "event": "agent_exited",
        "crossing_id": crossing_id,
        "exit_code": exit_code,
        "duration_ms": duration_ms,
    }));
}

/// Audit: remote job reached a terminal status
pub fn audit_job_completed(crossing_id: &str, job_id: &str, status: &str, exit_code: Option<i32>) {
    emit(json!({
        "ts": now(),
        "event": "job_completed",
        "crossing_id": crossing_id,
        "job_id": job_id,
        "status": status,
        "exit_code": exit_code,
    }));
}

/// Audit: crossing aborted
pub fn audit_crossing_failed(crossing_id: &str, side: &str, error_kind: &str) {
    emit(json!({
        "ts": now(),
        "event": "crossing_failed",
        "crossing_id": crossing_id,
        "side": side,
        "error_kind": error_kind,
    }));
}
