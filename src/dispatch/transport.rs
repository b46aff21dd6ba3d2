use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::TransportError;

/// Outbound email delivery.
///
/// Implement this for the real delivery backend (SMTP relay, HTTP API, ...).
/// The dispatcher awaits each call and retries any error it returns.
#[async_trait]
pub trait EmailTransport: Send + Sync + 'static {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError>;
}

/// Transport that delivers nothing: it logs each message and reports success.
///
/// Used for dry runs. Messages are also kept in memory so callers can inspect
/// what would have gone out.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    outbox: Mutex<Vec<OutgoingMessage>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outbox(&self) -> Vec<OutgoingMessage> {
        self.outbox.lock().clone()
    }
}

#[async_trait]
impl EmailTransport for DryRunTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        log::info!("dry run: would send '{}' to {} ({} bytes)", subject, to, body.len());
        self.outbox.lock().push(OutgoingMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
