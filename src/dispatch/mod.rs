//! Batch email dispatch.
//!
//! Renders one template per recipient and hands the result to an
//! [`EmailTransport`]:
//!
//! - recipients are split into batches run one after another, with a pause
//!   between batches
//! - inside a batch, sends run concurrently up to a bound
//! - every send attempt, retries included, waits on one shared [`RateLimiter`]
//! - opted-out addresses are skipped, and every skip, render failure and
//!   attempt lands in the audit trail
//!
//! Per-recipient problems never abort a run. Only an unknown template or an
//! invalid [`BatchProcessingConfig`] does, and both are checked before the
//! first send.

pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod jobs;
pub mod rate_limiter;
pub mod template;
pub mod tracker;
pub mod transport;

pub use audit::{AuditLogger, count_by_status, write_json_lines};
pub use config::{BatchProcessingConfig, DispatcherConfig};
pub use dispatcher::{BatchDispatcher, DispatchReport, DispatchSummary};
pub use error::{DispatchError, DispatchResult, TemplateError, TransportError};
pub use jobs::{JobManager, JobProgress, JobState, JobStatus};
pub use rate_limiter::RateLimiter;
pub use template::{RenderedEmail, TemplateStore, placeholders, render};
pub use tracker::EmailStatusTracker;
pub use transport::{DryRunTransport, EmailTransport, OutgoingMessage};
