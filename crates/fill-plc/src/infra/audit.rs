//! Audit trail of batch events.
//!
//! One JSON object per line: process start and stop, batch and stage
//! transitions, flow warnings and operator cancels.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// What happened. Serialized as `event_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SystemStart,
    SystemShutdown,
    BatchStarted,
    /// Every stage reached its target
    BatchCompleted,
    BatchAborted,
    StageStarted,
    StageCompleted,
    StageAborted,
    /// Non-fatal flow switch anomaly
    FlowWarning,
    /// Ctrl-C received while a batch was running
    OperatorCancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Wall-clock time, RFC 3339 with milliseconds
    pub timestamp: String,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Append-only JSONL writer shared by the runtime and the stage observer.
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Open `path` for appending, creating parent directories.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Stamp and write one event. Failures are logged, never propagated.
    pub fn log_event(&self, event_type: AuditEventType, details: serde_json::Value) {
        let entry = AuditEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event_type,
            details,
        };
        if let Err(e) = self.log(&entry) {
            tracing::warn!(error = %e, ?event_type, "Failed to write audit entry");
        }
    }
}
