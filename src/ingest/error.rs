use thiserror::Error;

use super::IngestReport;

pub type IngestResult<T> = Result<T, IngestError>;

/// Fatal ingestion failures. Per-row problems are not errors at this level;
/// they are collected in [`IngestReport::errors`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file is {size} bytes, limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("invalid header: {0}")]
    HeaderInvalid(String),
    #[error("file has more than {limit} data rows")]
    TooManyRows {
        limit: usize,
        /// Rows validated before the cap was hit.
        partial: Box<IngestReport>,
    },
    #[error("import cancelled after {} rows", .partial.stats.total_rows)]
    Cancelled { partial: Box<IngestReport> },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl IngestError {
    /// Rows that were validated before the operation stopped, if any.
    pub fn partial_report(&self) -> Option<&IngestReport> {
        match self {
            IngestError::TooManyRows { partial, .. } | IngestError::Cancelled { partial } => {
                Some(partial)
            }
            _ => None,
        }
    }
}
