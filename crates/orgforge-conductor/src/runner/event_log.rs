//! Structured event logging for generation runs.
//!
//! Writes append-only JSONL to `{out}/events.jsonl`. A logger without a
//! directory drops everything, which is what dry runs and tests use.

use orgforge_core::ScenarioKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

// ── Event types ──

/// A run event. Serialized as tagged JSON (`"type": "run_start"`, etc.).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStart {
        run_id: String,
        seed: u64,
        generator: String,
        requested: u32,
        planned: usize,
        fingerprint: String,
    },
    ScenarioDeficit {
        deficits: BTreeMap<ScenarioKind, u32>,
    },
    AttemptStart {
        event_id: String,
        attempt: u32,
    },
    ArtifactRejected {
        event_id: String,
        attempt: u32,
        violations: Vec<String>,
    },
    EventValidated {
        event_id: String,
        attempt: u32,
        duration_ms: u64,
    },
    EventFailed {
        event_id: String,
        attempts: u32,
        duration_ms: u64,
        error: String,
    },
    RunCompleted {
        succeeded: usize,
        failed: usize,
        skipped: u32,
        duration_ms: u64,
    },
}

/// Wrapper that adds sequence number and timestamp to each event.
#[derive(Debug, Serialize)]
pub struct FullEvent {
    pub seq: u32,
    pub ts: String,
    #[serde(flatten)]
    pub event: Event,
}

// ── EventLogger ──

/// Append-only JSONL event writer.
pub struct EventLogger {
    jsonl_path: Option<PathBuf>,
    seq: u32,
}

impl EventLogger {
    /// Path: `{dir}/events.jsonl`.
    pub fn new(dir: &Path) -> Self {
        Self {
            jsonl_path: Some(dir.join("events.jsonl")),
            seq: 0,
        }
    }

    pub fn disabled() -> Self {
        Self {
            jsonl_path: None,
            seq: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.jsonl_path.as_deref()
    }

    /// Record an event. Best-effort: silently ignores write failures.
    pub fn record(&mut self, event: Event) {
        let full = FullEvent {
            seq: self.seq,
            ts: now_rfc3339(),
            event,
        };
        self.seq += 1;

        let Some(path) = &self.jsonl_path else {
            return;
        };
        if let Ok(line) = serde_json::to_string(&full) {
            let _ = append_line(path, &line);
        }
    }
}

/// Append a single line to a file, creating parent dirs if needed.
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
