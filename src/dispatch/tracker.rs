//! Per-address delivery and opt-out state.
//!
//! In-memory only; state lives as long as the tracker. Keys are the address
//! strings exactly as given, so `Bob@x.com` and `bob@x.com` are tracked
//! separately.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use crate::models::EmailStatus;

/// Concurrent address → [`EmailStatus`] map.
///
/// Cloning is cheap and clones share the same underlying map, so one tracker
/// can be handed to several dispatchers.
#[derive(Debug, Clone, Default)]
pub struct EmailStatusTracker {
    statuses: Arc<DashMap<String, EmailStatus>>,
}

impl EmailStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful delivery, clearing any earlier error.
    pub fn record_sent(&self, address: &str) {
        let mut status = self.statuses.entry(address.to_string()).or_default();
        status.sent = true;
        status.sent_at = Some(Utc::now());
        status.error = None;
    }

    /// Record the latest failure. An earlier successful send stays recorded.
    pub fn record_error(&self, address: &str, message: &str) {
        let mut status = self.statuses.entry(address.to_string()).or_default();
        status.error = Some(message.to_string());
    }

    /// Block all future sends to `address`. Repeat calls keep the original
    /// opt-out time.
    pub fn mark_opt_out(&self, address: &str) {
        let mut status = self.statuses.entry(address.to_string()).or_default();
        if !status.opted_out {
            status.opted_out = true;
            status.opted_out_at = Some(Utc::now());
            log::info!("tracker: {} opted out", address);
        }
    }

    pub fn get_status(&self, address: &str) -> Option<EmailStatus> {
        self.statuses.get(address).map(|entry| entry.value().clone())
    }

    pub fn is_opted_out(&self, address: &str) -> bool {
        self.statuses
            .get(address)
            .map(|entry| entry.opted_out)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
