pub(crate) mod config;
pub mod dispatch;
pub mod ingest;
pub mod models;

use env_logger::Env;
use std::sync::Once;

pub use dispatch::{
    AuditLogger, BatchDispatcher, BatchProcessingConfig, DispatchReport, DispatcherConfig,
    DryRunTransport, EmailStatusTracker, EmailTransport, JobManager, TemplateStore,
};
pub use ingest::{CsvIngestor, IngestConfig, IngestError, IngestReport};
pub use models::{AuditLogEntry, CsvRow, EmailTemplate, Recipient};

static LOGGER: Once = Once::new();

/// Install the global logger. Safe to call more than once.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    });
}
