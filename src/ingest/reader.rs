use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use csv::{ErrorKind, ReaderBuilder, StringRecord};
use tokio_util::sync::CancellationToken;

use super::config::IngestConfig;
use super::error::{IngestError, IngestResult};
use super::events::{IngestLogEvent, IngestObserver, LogType};
use super::report::IngestReport;
use super::sanitize::sanitize;
use super::validate::validate_row;
use crate::models::CsvRow;

/// Streaming contact-list importer.
///
/// Rows are read, sanitized and validated one at a time; the file is never
/// buffered in full. Control returns to the runtime between rows so a large
/// import does not starve other tasks, and the cancellation token is checked
/// before every row.
pub struct CsvIngestor {
    config: IngestConfig,
}

impl CsvIngestor {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Import a file from disk. The size limit is checked against the file's
    /// metadata before anything is parsed.
    ///
    /// The file is opened off the runtime. Rows are then pulled through an
    /// 8 KiB buffer with a yield after every row, so no single poll blocks
    /// for more than one buffered read.
    pub async fn ingest_path(
        &self,
        path: &Path,
        observer: &dyn IngestObserver,
        cancel: &CancellationToken,
    ) -> IngestResult<IngestReport> {
        let size = tokio::fs::metadata(path).await?.len();
        self.check_size(size)?;

        log::info!("import: reading {} ({} bytes)", path.display(), size);
        let owned = path.to_path_buf();
        let file = tokio::task::spawn_blocking(move || File::open(owned))
            .await
            .map_err(io::Error::other)??;
        self.ingest_reader(BufReader::new(file), observer, cancel).await
    }

    pub async fn ingest_bytes(
        &self,
        bytes: &[u8],
        observer: &dyn IngestObserver,
        cancel: &CancellationToken,
    ) -> IngestResult<IngestReport> {
        self.check_size(bytes.len() as u64)?;
        self.ingest_reader(bytes, observer, cancel).await
    }

    /// Import from any reader. Readers of unknown length are capped while
    /// streaming; crossing the limit aborts with `FileTooLarge`.
    pub async fn ingest_reader<R: Read>(
        &self,
        reader: R,
        observer: &dyn IngestObserver,
        cancel: &CancellationToken,
    ) -> IngestResult<IngestReport> {
        let capped = CappedReader::new(reader, self.config.max_file_bytes);
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(capped);

        let headers = csv_reader
            .headers()
            .map_err(|err| self.map_csv_error(err))?
            .clone();

        let mut report = IngestReport::default();
        let columns = self.resolve_columns(&headers, &mut report)?;
        for warning in &report.warnings {
            log::warn!("import: {}", warning);
            observer.on_log(IngestLogEvent::new(LogType::Warning, warning.to_string(), None));
        }

        let max_rows = self.config.max_rows;
        let mut record = StringRecord::new();
        let mut rows_seen = 0usize;

        loop {
            if cancel.is_cancelled() {
                log::warn!("import: cancelled after {} rows", rows_seen);
                return Err(IngestError::Cancelled {
                    partial: Box::new(report),
                });
            }

            let read = csv_reader.read_record(&mut record);
            let malformed = match read {
                Ok(false) => break,
                Ok(true) => None,
                Err(err) if matches!(err.kind(), ErrorKind::Io(_)) => {
                    return Err(self.map_csv_error(err));
                }
                Err(err) => Some(err),
            };

            rows_seen += 1;
            if rows_seen > max_rows {
                log::warn!("import: row cap of {} exceeded, aborting", max_rows);
                observer.on_log(IngestLogEvent::new(
                    LogType::Error,
                    format!("File exceeds the limit of {} rows", max_rows),
                    Some(rows_seen),
                ));
                return Err(IngestError::TooManyRows {
                    limit: max_rows,
                    partial: Box::new(report),
                });
            }

            let errors_before = report.errors.len();
            let warnings_before = report.warnings.len();

            match malformed {
                Some(err) => report.record_malformed(rows_seen, format!("Malformed row ({})", err)),
                None => {
                    let row = columns.build_row(&record);
                    let result = validate_row(&row);
                    report.record_row(rows_seen, row, result);
                }
            }

            for error in &report.errors[errors_before..] {
                log::debug!("import: {}", error);
                observer.on_log(IngestLogEvent::new(LogType::Error, error.to_string(), Some(rows_seen)));
            }
            for warning in &report.warnings[warnings_before..] {
                observer.on_log(IngestLogEvent::new(
                    LogType::Warning,
                    warning.to_string(),
                    Some(rows_seen),
                ));
            }

            observer.on_progress(progress_percent(rows_seen, max_rows));

            if rows_seen % self.config.log_every.max(1) == 0 {
                log::info!(
                    "import: processed {} rows ({} valid, {} invalid)",
                    rows_seen,
                    report.stats.valid_rows,
                    report.stats.invalid_rows
                );
                observer.on_log(IngestLogEvent::new(
                    LogType::Info,
                    format!("Processed {} rows", rows_seen),
                    Some(rows_seen),
                ));
            }

            tokio::task::yield_now().await;
        }

        log::info!(
            "import: complete - {} rows, {} valid, {} invalid, {} warnings",
            report.stats.total_rows,
            report.stats.valid_rows,
            report.stats.invalid_rows,
            report.warnings.len()
        );
        observer.on_log(IngestLogEvent::new(
            LogType::Info,
            format!(
                "Import complete: {} valid, {} invalid",
                report.stats.valid_rows, report.stats.invalid_rows
            ),
            None,
        ));

        Ok(report)
    }

    fn check_size(&self, size: u64) -> IngestResult<()> {
        if size > self.config.max_file_bytes {
            log::warn!(
                "import: rejecting {} byte file (limit {})",
                size,
                self.config.max_file_bytes
            );
            return Err(IngestError::FileTooLarge {
                size,
                limit: self.config.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Map the header row onto known columns. Unknown columns only warn;
    /// duplicates and missing required columns are fatal.
    fn resolve_columns(
        &self,
        headers: &StringRecord,
        report: &mut IngestReport,
    ) -> IngestResult<ColumnMap> {
        let mut indices = HashMap::new();
        let mut seen = HashSet::new();

        for (idx, raw) in headers.iter().enumerate() {
            let header = normalize_header(raw);
            if header.is_empty() {
                report.header_warning(format!("Column {} has no header and will be ignored", idx + 1));
                continue;
            }

            if !seen.insert(header.clone()) {
                return Err(IngestError::HeaderInvalid(format!(
                    "duplicate column '{}'",
                    header
                )));
            }

            if self.config.is_known_header(&header) {
                indices.insert(header, idx);
            } else {
                report.header_warning(format!("Unknown column '{}' will be ignored", header));
            }
        }

        let missing: Vec<&str> = self
            .config
            .required_headers
            .iter()
            .filter(|required| !indices.contains_key(required.as_str()))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(IngestError::HeaderInvalid(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )));
        }

        Ok(ColumnMap { indices })
    }

    fn map_csv_error(&self, err: csv::Error) -> IngestError {
        if let ErrorKind::Io(io_err) = err.kind() {
            if let Some(exceeded) = io_err
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<SizeLimitExceeded>())
            {
                return IngestError::FileTooLarge {
                    size: exceeded.read,
                    limit: exceeded.limit,
                };
            }
        }
        IngestError::Csv(err)
    }
}

impl Default for CsvIngestor {
    fn default() -> Self {
        Self::new(IngestConfig::default())
    }
}

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_lowercase()
}

fn progress_percent(rows_seen: usize, max_rows: usize) -> f64 {
    if max_rows == 0 {
        return 100.0;
    }
    (rows_seen as f64 * 100.0 / max_rows as f64).min(100.0)
}

struct ColumnMap {
    indices: HashMap<String, usize>,
}

impl ColumnMap {
    fn field(&self, record: &StringRecord, column: &str) -> Option<String> {
        self.indices
            .get(column)
            .map(|idx| record.get(*idx).map(sanitize).unwrap_or_default())
    }

    fn build_row(&self, record: &StringRecord) -> CsvRow {
        CsvRow {
            name: self.field(record, "name").unwrap_or_default(),
            email: self.field(record, "email").unwrap_or_default(),
            company: self.field(record, "company"),
            role: self.field(record, "role"),
        }
    }
}

#[derive(Debug)]
struct SizeLimitExceeded {
    read: u64,
    limit: u64,
}

impl fmt::Display for SizeLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input exceeds {} bytes", self.limit)
    }
}

impl std::error::Error for SizeLimitExceeded {}

/// Reader that fails once more than `limit` bytes have come through.
struct CappedReader<R> {
    inner: R,
    limit: u64,
    read: u64,
}

impl<R> CappedReader<R> {
    fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }
}

impl<R: Read> Read for CappedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if self.read > self.limit {
            return Err(io::Error::other(SizeLimitExceeded {
                read: self.read,
                limit: self.limit,
            }));
        }
        Ok(n)
    }
}
