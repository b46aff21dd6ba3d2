use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ===== Contact Import Models =====

/// One contact row. Values are raw until the ingestor runs them through the
/// sanitizer; rows handed out in an [`IngestReport`](crate::ingest::IngestReport)
/// are always sanitized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvRow {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

// ===== Dispatch Models =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: String,
    pub subject: String,
    pub body: String,
    /// Every placeholder a recipient must supply, in declaration order.
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    pub variables: HashMap<String, String>,
}

impl Recipient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            variables: HashMap::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Build a recipient from a validated contact row.
    ///
    /// The row's columns become template variables (`name`, `email`, and
    /// `company`/`role` when present and non-empty).
    pub fn from_row(row: &CsvRow) -> Self {
        let mut recipient = Self::new(row.email.clone())
            .with_variable("name", row.name.clone())
            .with_variable("email", row.email.clone());

        if let Some(company) = row.company.as_deref().filter(|c| !c.is_empty()) {
            recipient = recipient.with_variable("company", company);
        }
        if let Some(role) = row.role.as_deref().filter(|r| !r.is_empty()) {
            recipient = recipient.with_variable("role", role);
        }

        recipient
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailStatus {
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub opted_out: bool,
    pub opted_out_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Error,
}

/// What a single audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    EmailSent,
    SendFailed,
    OptedOutSkipped,
    RenderFailed,
    Cancelled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::EmailSent => "email_sent",
            AuditAction::SendFailed => "send_failed",
            AuditAction::OptedOutSkipped => "opted_out_skipped",
            AuditAction::RenderFailed => "render_failed",
            AuditAction::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub email: String,
    pub details: String,
    pub status: AuditStatus,
}

impl AuditLogEntry {
    pub fn success(action: AuditAction, email: &str, details: impl Into<String>) -> Self {
        Self::new(action, email, details, AuditStatus::Success)
    }

    pub fn error(action: AuditAction, email: &str, details: impl Into<String>) -> Self {
        Self::new(action, email, details, AuditStatus::Error)
    }

    fn new(action: AuditAction, email: &str, details: impl Into<String>, status: AuditStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            email: email.to_string(),
            details: details.into(),
            status,
        }
    }
}
