use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::audit::AuditLogger;
use super::config::{BatchProcessingConfig, DispatcherConfig};
use super::error::{DispatchError, DispatchResult};
use super::jobs::{JobManager, JobStatus};
use super::rate_limiter::RateLimiter;
use super::template::{TemplateStore, render};
use super::tracker::EmailStatusTracker;
use super::transport::EmailTransport;
use crate::models::{AuditAction, AuditLogEntry, EmailTemplate, Recipient};

/// How one recipient settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    Failed,
    OptedOut,
    RenderFailed,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub opted_out: usize,
    pub render_failed: usize,
    pub cancelled: usize,
    /// Recipients in batches that never started because the run was cancelled.
    pub not_attempted: usize,
}

impl DispatchSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Sent => self.sent += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::OptedOut => self.opted_out += 1,
            Outcome::RenderFailed => self.render_failed += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// What one batch left behind for the job record.
#[derive(Debug, Default)]
struct SettledBatch {
    count: usize,
    /// `address: reason` for each recipient that ended failed or unrenderable.
    failures: Vec<String>,
}

/// Result of one dispatch run.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub run_id: Uuid,
    pub template_id: String,
    /// Every audit entry of the run, in the order it was recorded.
    pub entries: Vec<AuditLogEntry>,
    /// Size of each batch that was started, in order.
    pub batch_sizes: Vec<usize>,
    pub summary: DispatchSummary,
    pub cancelled: bool,
}

/// Everything a per-recipient task needs, shared across one run.
struct SendContext {
    template: EmailTemplate,
    tracker: EmailStatusTracker,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn EmailTransport>,
    audit: Arc<AuditLogger>,
    cancel: CancellationToken,
    max_retries: u32,
    retry_delay: Duration,
}

impl SendContext {
    async fn process(&self, recipient: Recipient) -> Outcome {
        let address = recipient.address.as_str();

        if self.tracker.is_opted_out(address) {
            return self.skip_opted_out(address);
        }

        let rendered = match render(&self.template, &recipient.variables) {
            Ok(rendered) => rendered,
            Err(e) => {
                log::warn!("dispatch: cannot render '{}' for {}: {}", self.template.id, address, e);
                self.tracker.record_error(address, &e.to_string());
                self.audit
                    .record(AuditLogEntry::error(AuditAction::RenderFailed, address, e.to_string()));
                return Outcome::RenderFailed;
            }
        };

        let attempts = self.max_retries + 1;
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::select! {
                    _ = tokio::time::sleep(self.retry_delay) => {}
                    _ = self.cancel.cancelled() => return self.abandon(address, attempt),
                }
                // An opt-out can land while we wait to retry.
                if self.tracker.is_opted_out(address) {
                    return self.skip_opted_out(address);
                }
            }

            if self.limiter.acquire(&self.cancel).await.is_none() {
                return self.abandon(address, attempt);
            }

            match self
                .transport
                .send(address, &rendered.subject, &rendered.body)
                .await
            {
                Ok(()) => {
                    self.tracker.record_sent(address);
                    self.audit.record(AuditLogEntry::success(
                        AuditAction::EmailSent,
                        address,
                        format!("sent on attempt {}/{}", attempt, attempts),
                    ));
                    return Outcome::Sent;
                }
                Err(e) => {
                    self.tracker.record_error(address, &e.to_string());
                    self.audit.record(AuditLogEntry::error(
                        AuditAction::SendFailed,
                        address,
                        format!("attempt {}/{}: {}", attempt, attempts, e),
                    ));
                    if attempt < attempts {
                        log::debug!("dispatch: attempt {}/{} to {} failed: {}", attempt, attempts, address, e);
                    } else {
                        log::warn!("dispatch: giving up on {} after {} attempts: {}", address, attempts, e);
                    }
                }
            }
        }

        Outcome::Failed
    }

    fn skip_opted_out(&self, address: &str) -> Outcome {
        log::debug!("dispatch: {} has opted out, skipping", address);
        self.audit.record(AuditLogEntry::error(
            AuditAction::OptedOutSkipped,
            address,
            "recipient has opted out",
        ));
        Outcome::OptedOut
    }

    fn abandon(&self, address: &str, attempt: u32) -> Outcome {
        self.audit.record(AuditLogEntry::error(
            AuditAction::Cancelled,
            address,
            format!("cancelled before attempt {}", attempt),
        ));
        Outcome::Cancelled
    }
}

/// Sends a template to a list of recipients in sequential batches.
///
/// Within a batch at most `max_concurrent` recipients are in flight, and every
/// send attempt across all of them passes the shared [`RateLimiter`]. Failures
/// are retried with a fixed delay and audited per attempt; nothing short of
/// an unknown template or a bad configuration stops the run.
pub struct BatchDispatcher {
    templates: TemplateStore,
    tracker: EmailStatusTracker,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn EmailTransport>,
    retry_delay: Duration,
}

impl BatchDispatcher {
    pub fn new(
        transport: Arc<dyn EmailTransport>,
        templates: TemplateStore,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            templates,
            tracker: EmailStatusTracker::new(),
            limiter: Arc::new(RateLimiter::new(config.sends_per_second)),
            transport,
            retry_delay: config.retry_delay,
        }
    }

    /// Use an existing tracker, e.g. one shared with an opt-out handler.
    pub fn with_tracker(mut self, tracker: EmailStatusTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &EmailStatusTracker {
        &self.tracker
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub async fn dispatch(
        &self,
        recipients: &[Recipient],
        template_id: &str,
        config: &BatchProcessingConfig,
        cancel: &CancellationToken,
    ) -> DispatchResult<DispatchReport> {
        self.run(recipients, template_id, config, AuditLogger::new(), cancel.clone(), None)
            .await
    }

    /// Dispatch as a tracked job: progress goes to `job`, cancelling the job
    /// stops the run, and `audit` receives entries as they are recorded.
    pub async fn dispatch_job(
        &self,
        job: &JobManager,
        recipients: &[Recipient],
        template_id: &str,
        config: &BatchProcessingConfig,
        audit: AuditLogger,
    ) -> DispatchResult<DispatchReport> {
        job.start_job(JobStatus::Sending, Some(recipients.len()))
            .await
            .map_err(DispatchError::JobConflict)?;

        let result = self
            .run(recipients, template_id, config, audit, job.token(), Some(job))
            .await;

        match &result {
            Ok(report) if report.cancelled => {
                if job.get_state().await.status != JobStatus::Cancelled {
                    job.cancel_job().await;
                }
            }
            Ok(_) => job.complete_job().await,
            Err(e) => job.fail_job(e.to_string()).await,
        }

        result
    }

    async fn run(
        &self,
        recipients: &[Recipient],
        template_id: &str,
        config: &BatchProcessingConfig,
        audit: AuditLogger,
        cancel: CancellationToken,
        job: Option<&JobManager>,
    ) -> DispatchResult<DispatchReport> {
        config.validate()?;
        let template = self
            .templates
            .get(template_id)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownTemplate(template_id.to_string()))?;

        let run_id = Uuid::new_v4();
        let batch_count = recipients.len().div_ceil(config.batch_size);
        log::info!(
            "dispatch {}: sending '{}' to {} recipients in {} batches (size {}, concurrency {}, retries {})",
            run_id,
            template_id,
            recipients.len(),
            batch_count,
            config.batch_size,
            config.max_concurrent,
            config.max_retries
        );

        let audit = Arc::new(audit);
        let ctx = Arc::new(SendContext {
            template,
            tracker: self.tracker.clone(),
            limiter: self.limiter.clone(),
            transport: self.transport.clone(),
            audit: audit.clone(),
            cancel: cancel.clone(),
            max_retries: config.max_retries,
            retry_delay: self.retry_delay,
        });

        let mut summary = DispatchSummary::default();
        let mut batch_sizes = Vec::with_capacity(batch_count);
        let mut started = 0usize;

        for (index, batch) in recipients.chunks(config.batch_size).enumerate() {
            if index > 0 && !config.delay_between_batches.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(config.delay_between_batches) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            log::info!("dispatch {}: batch {}/{} ({} recipients)", run_id, index + 1, batch_count, batch.len());
            if let Some(job) = job {
                job.update_status(JobStatus::Sending, format!("batch {}/{}", index + 1, batch_count))
                    .await;
            }
            batch_sizes.push(batch.len());
            let settled = self.run_batch(&ctx, batch, config.max_concurrent, &mut summary).await;
            started += settled.count;

            if let Some(job) = job {
                for failure in settled.failures {
                    job.add_error(failure).await;
                }
                job.batch_completed(settled.count).await;
            }
        }

        summary.not_attempted = recipients.len() - started;
        let cancelled = cancel.is_cancelled();

        // All tasks have been joined, so this is the last reference.
        drop(ctx);
        let entries = match Arc::try_unwrap(audit) {
            Ok(logger) => logger.into_entries(),
            Err(shared) => shared.entries(),
        };

        if cancelled {
            log::warn!(
                "dispatch {}: cancelled after {} of {} batches ({} recipients not attempted)",
                run_id,
                batch_sizes.len(),
                batch_count,
                summary.not_attempted
            );
        } else {
            log::info!(
                "dispatch {}: done - {} sent, {} failed, {} opted out, {} render failures",
                run_id,
                summary.sent,
                summary.failed,
                summary.opted_out,
                summary.render_failed
            );
        }

        Ok(DispatchReport {
            run_id,
            template_id: template_id.to_string(),
            entries,
            batch_sizes,
            summary,
            cancelled,
        })
    }

    /// Run one batch to completion.
    async fn run_batch(
        &self,
        ctx: &Arc<SendContext>,
        batch: &[Recipient],
        max_concurrent: usize,
        summary: &mut DispatchSummary,
    ) -> SettledBatch {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut tasks = JoinSet::new();
        let mut addresses = HashMap::with_capacity(batch.len());

        for recipient in batch {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let ctx = ctx.clone();
            let address = recipient.address.clone();
            let recipient = recipient.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                ctx.process(recipient).await
            });
            addresses.insert(handle.id(), address);
        }

        let mut settled = SettledBatch::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            settled.count += 1;
            match joined {
                Ok((id, outcome)) => {
                    summary.record(outcome);
                    if matches!(outcome, Outcome::Failed | Outcome::RenderFailed) {
                        let address = addresses.get(&id).map(String::as_str).unwrap_or_default();
                        let reason = ctx
                            .tracker
                            .get_status(address)
                            .and_then(|status| status.error)
                            .unwrap_or_default();
                        settled.failures.push(format!("{}: {}", address, reason));
                    }
                }
                Err(e) => {
                    let address = addresses.get(&e.id()).cloned().unwrap_or_default();
                    log::error!("dispatch: send task for {} died: {}", address, e);
                    ctx.tracker.record_error(&address, &e.to_string());
                    ctx.audit.record(AuditLogEntry::error(
                        AuditAction::SendFailed,
                        &address,
                        format!("send task died: {}", e),
                    ));
                    summary.failed += 1;
                }
            }
        }
        settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::error::TransportError;
    use crate::models::AuditStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyTransport {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmailTransport for FlakyTransport {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(TransportError::Unavailable("try later".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            sends_per_second: 1000,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn batch_config(max_retries: u32) -> BatchProcessingConfig {
        BatchProcessingConfig {
            batch_size: 10,
            delay_between_batches: Duration::ZERO,
            max_retries,
            max_concurrent: 2,
        }
    }

    fn store() -> TemplateStore {
        [EmailTemplate::from_parts("welcome", "Hi {{name}}", "Hello {{name}}")]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_retry_then_success_audits_each_attempt() {
        let transport = Arc::new(FlakyTransport { failures: 2, calls: AtomicUsize::new(0) });
        let dispatcher = BatchDispatcher::new(transport.clone(), store(), fast_config());
        let recipients = vec![Recipient::new("a@example.com").with_variable("name", "Ann")];

        let report = dispatcher
            .dispatch(&recipients, "welcome", &batch_config(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.entries[0].action, AuditAction::SendFailed);
        assert_eq!(report.entries[1].action, AuditAction::SendFailed);
        assert_eq!(report.entries[2].action, AuditAction::EmailSent);
        assert_eq!(report.entries[2].status, AuditStatus::Success);
        assert_eq!(report.summary.sent, 1);
        assert!(dispatcher.tracker().get_status("a@example.com").unwrap().sent);
    }

    #[tokio::test]
    async fn test_exhausted_retries_count_as_failed() {
        let transport = Arc::new(FlakyTransport { failures: usize::MAX, calls: AtomicUsize::new(0) });
        let dispatcher = BatchDispatcher::new(transport.clone(), store(), fast_config());
        let recipients = vec![Recipient::new("a@example.com").with_variable("name", "Ann")];

        let report = dispatcher
            .dispatch(&recipients, "welcome", &batch_config(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.entries.len(), 2);
        assert!(report.entries.iter().all(|e| e.action == AuditAction::SendFailed));
        assert_eq!(report.summary.failed, 1);

        let status = dispatcher.tracker().get_status("a@example.com").unwrap();
        assert!(!status.sent);
        assert!(status.error.unwrap().contains("try later"));
    }

    #[tokio::test]
    async fn test_unknown_template_sends_nothing() {
        let transport = Arc::new(FlakyTransport { failures: 0, calls: AtomicUsize::new(0) });
        let dispatcher = BatchDispatcher::new(transport.clone(), store(), fast_config());
        let recipients = vec![Recipient::new("a@example.com")];

        let err = dispatcher
            .dispatch(&recipients, "missing", &batch_config(0), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::UnknownTemplate(id) if id == "missing"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_attempts_nothing() {
        let transport = Arc::new(FlakyTransport { failures: 0, calls: AtomicUsize::new(0) });
        let dispatcher = BatchDispatcher::new(transport.clone(), store(), fast_config());
        let recipients = vec![Recipient::new("a@example.com").with_variable("name", "Ann")];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = dispatcher
            .dispatch(&recipients, "welcome", &batch_config(0), &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.batch_sizes.is_empty());
        assert_eq!(report.summary.not_attempted, 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_job_updates_job_state() {
        let transport = Arc::new(FlakyTransport { failures: 0, calls: AtomicUsize::new(0) });
        let dispatcher = BatchDispatcher::new(transport, store(), fast_config());
        let recipients: Vec<Recipient> = (0..3)
            .map(|i| Recipient::new(format!("r{}@example.com", i)).with_variable("name", "R"))
            .collect();
        let job = JobManager::new();
        let config = BatchProcessingConfig { batch_size: 2, ..batch_config(0) };

        let report = dispatcher
            .dispatch_job(&job, &recipients, "welcome", &config, AuditLogger::new())
            .await
            .unwrap();

        assert_eq!(report.batch_sizes, vec![2, 1]);
        let state = job.get_state().await;
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.progress.processed, 3);
        assert_eq!(state.progress.batches_completed, 2);
        assert_eq!(state.progress.current_step, "batch 2/2");
        assert!(state.progress.errors.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_job_collects_recipient_failures() {
        let transport = Arc::new(FlakyTransport { failures: usize::MAX, calls: AtomicUsize::new(0) });
        let dispatcher = BatchDispatcher::new(transport, store(), fast_config());
        let recipients = vec![
            Recipient::new("a@example.com").with_variable("name", "Ann"),
            Recipient::new("b@example.com"),
        ];
        let job = JobManager::new();

        let report = dispatcher
            .dispatch_job(&job, &recipients, "welcome", &batch_config(0), AuditLogger::new())
            .await
            .unwrap();

        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.render_failed, 1);

        let mut errors = job.get_state().await.progress.errors;
        errors.sort();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("a@example.com: "));
        assert!(errors[0].contains("try later"));
        assert_eq!(errors[1], "b@example.com: missing template variables: name");
    }
}
