use regex::Regex;
use std::sync::LazyLock;

use crate::models::{CsvRow, ValidationResult};

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_COMPANY_CHARS: usize = 200;
pub const MAX_ROLE_CHARS: usize = 100;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

/// Check an address against the `local@domain.tld` shape.
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_PATTERN.is_match(address)
}

/// Validate a row whose fields have already been sanitized.
///
/// Missing or malformed required fields are errors. Over-long optional text is
/// only a warning and does not invalidate the row.
pub fn validate_row(row: &CsvRow) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if row.name.is_empty() {
        errors.push("Missing name".to_string());
    }

    if row.email.is_empty() {
        errors.push("Missing email".to_string());
    } else if !is_valid_email(&row.email) {
        errors.push(format!("Invalid email format '{}'", row.email));
    }

    if row.name.chars().count() > MAX_NAME_CHARS {
        warnings.push(format!("Name exceeds {} characters", MAX_NAME_CHARS));
    }
    if let Some(company) = &row.company {
        if company.chars().count() > MAX_COMPANY_CHARS {
            warnings.push(format!("Company exceeds {} characters", MAX_COMPANY_CHARS));
        }
    }
    if let Some(role) = &row.role {
        if role.chars().count() > MAX_ROLE_CHARS {
            warnings.push(format!("Role exceeds {} characters", MAX_ROLE_CHARS));
        }
    }

    ValidationResult::from_findings(errors, warnings)
}
