use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    Info,
    Warning,
    Error,
}

/// A log line addressed to whatever UI is watching the import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestLogEvent {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub row_number: Option<usize>,
}

impl IngestLogEvent {
    pub fn new(log_type: LogType, message: impl Into<String>, row_number: Option<usize>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
            log_type,
            row_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IngestEvent {
    Progress(f64),
    Log(IngestLogEvent),
}

/// Observer hooks called by the ingestor, in row order.
///
/// Both methods default to doing nothing.
pub trait IngestObserver: Send + Sync {
    /// `percent` is `rows_seen / max_rows * 100`, capped at 100. It is
    /// measured against the configured row cap, not the file's real length.
    fn on_progress(&self, _percent: f64) {}

    fn on_log(&self, _event: IngestLogEvent) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl IngestObserver for NoopObserver {}

/// Forward events into a channel so a subscriber sees them as an ordered
/// stream. A dropped receiver is not an error; events are discarded.
impl IngestObserver for UnboundedSender<IngestEvent> {
    fn on_progress(&self, percent: f64) {
        let _ = self.send(IngestEvent::Progress(percent));
    }

    fn on_log(&self, event: IngestLogEvent) {
        let _ = self.send(IngestEvent::Log(event));
    }
}
