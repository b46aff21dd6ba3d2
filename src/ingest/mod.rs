//! Contact-list ingestion.
//!
//! Turns an untrusted CSV upload into a list of sanitized, validated contact
//! rows plus a per-row error and warning trail:
//!
//! 1. **Size gate** - oversize input is rejected before parsing (`FileTooLarge`)
//! 2. **Header check** (`reader`) - required columns must exist once; unknown
//!    columns are ignored with a warning
//! 3. **Sanitize** (`sanitize`) - every cell is neutralized against spreadsheet
//!    formula and HTML injection
//! 4. **Validate** (`validate`) - required fields and email shape; long text warns
//! 5. **Report** (`report`) - valid rows, row errors, warnings and counts
//!
//! Sanitization always runs before validation, so validation and everything
//! downstream (template rendering included) only ever sees sanitized text.
//!
//! Progress and log events go to an [`IngestObserver`]; the row cap and the
//! caller's cancellation token can both stop an import early, in which case
//! the rows validated so far ride along in the error.

pub mod config;
pub mod error;
pub mod events;
pub mod reader;
pub mod report;
pub mod sanitize;
pub mod validate;

pub use config::IngestConfig;
pub use error::{IngestError, IngestResult};
pub use events::{IngestEvent, IngestLogEvent, IngestObserver, LogType, NoopObserver};
pub use reader::CsvIngestor;
pub use report::{IngestReport, IngestStats, IngestWarning, RowError};
pub use sanitize::sanitize;
pub use validate::{is_valid_email, validate_row};
