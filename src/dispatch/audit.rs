use parking_lot::Mutex;
use std::io::Write;
use tokio::sync::mpsc::UnboundedSender;

use crate::models::{AuditLogEntry, AuditStatus};

/// Append-only audit trail for one dispatch run.
///
/// Entries are kept in the order they were recorded and, when a subscriber
/// is attached, forwarded to it as they happen.
#[derive(Debug, Default)]
pub struct AuditLogger {
    entries: Mutex<Vec<AuditLogEntry>>,
    subscriber: Option<UnboundedSender<AuditLogEntry>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriber(subscriber: UnboundedSender<AuditLogEntry>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            subscriber: Some(subscriber),
        }
    }

    pub fn record(&self, entry: AuditLogEntry) {
        // Forward under the lock so the subscriber sees the same order.
        let mut entries = self.entries.lock();
        if let Some(subscriber) = &self.subscriber {
            let _ = subscriber.send(entry.clone());
        }
        entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().clone()
    }

    pub fn into_entries(self) -> Vec<AuditLogEntry> {
        self.entries.into_inner()
    }
}

/// Count entries by status: `(successes, errors)`.
pub fn count_by_status(entries: &[AuditLogEntry]) -> (usize, usize) {
    entries.iter().fold((0, 0), |(ok, err), entry| match entry.status {
        AuditStatus::Success => (ok + 1, err),
        AuditStatus::Error => (ok, err + 1),
    })
}

/// Write entries as JSON lines, one entry per line.
pub fn write_json_lines<W: Write>(entries: &[AuditLogEntry], mut out: W) -> std::io::Result<()> {
    for entry in entries {
        serde_json::to_writer(&mut out, entry)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}
