//! Import results.
//!
//! Every data row lands in exactly one bucket: `valid_rows` or `errors`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{CsvRow, ValidationResult};

/// Row counts for a single import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Data rows read (header excluded)
    pub total_rows: usize,
    /// Rows that passed validation
    pub valid_rows: usize,
    /// Rows excluded because of at least one error
    pub invalid_rows: usize,
}

/// A row excluded from the valid set, with every reason it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based data row index (the header is not counted)
    pub row: usize,
    pub reasons: Vec<String>,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: {}", self.row, self.reasons.join(", "))
    }
}

/// A non-fatal finding. `row` is `None` for header-level warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestWarning {
    pub row: Option<usize>,
    pub message: String,
}

impl fmt::Display for IngestWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "Row {}: {}", row, self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub valid_rows: Vec<CsvRow>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<IngestWarning>,
    pub stats: IngestStats,
}

impl IngestReport {
    pub(crate) fn header_warning(&mut self, message: String) {
        self.warnings.push(IngestWarning { row: None, message });
    }

    /// File a row under the bucket its validation result dictates.
    pub(crate) fn record_row(&mut self, row_number: usize, row: CsvRow, result: ValidationResult) {
        self.stats.total_rows += 1;

        self.warnings.extend(result.warnings.into_iter().map(|message| IngestWarning {
            row: Some(row_number),
            message,
        }));

        if result.is_valid {
            self.stats.valid_rows += 1;
            self.valid_rows.push(row);
        } else {
            self.record_invalid(row_number, result.errors);
        }
    }

    /// Count a row that never produced a `CsvRow`, e.g. a malformed record.
    pub(crate) fn record_malformed(&mut self, row_number: usize, reason: String) {
        self.stats.total_rows += 1;
        self.record_invalid(row_number, vec![reason]);
    }

    fn record_invalid(&mut self, row_number: usize, reasons: Vec<String>) {
        self.stats.invalid_rows += 1;
        self.errors.push(RowError {
            row: row_number,
            reasons,
        });
    }

    /// File-level roll-up of every row error and warning.
    pub fn validation(&self) -> ValidationResult {
        ValidationResult::from_findings(
            self.errors.iter().map(ToString::to_string).collect(),
            self.warnings.iter().map(ToString::to_string).collect(),
        )
    }
}
