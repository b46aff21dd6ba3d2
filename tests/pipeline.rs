use std::sync::Arc;
use std::time::Duration;

use campaign_dispatch::dispatch::{
    AuditLogger, BatchDispatcher, BatchProcessingConfig, DispatcherConfig, DryRunTransport,
    JobManager, JobStatus, TemplateStore, write_json_lines,
};
use campaign_dispatch::ingest::{CsvIngestor, NoopObserver};
use campaign_dispatch::models::{AuditAction, AuditLogEntry, Recipient};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CONTACTS: &str = "\
Name,Email,Company,Role
Alice,alice@example.com,<Acme & Co>,CTO
,nobody@example.com,Ghost Inc,
Bob,bob@example.com,,Engineer
Carol,not-an-email,Initech,
";

const TEMPLATES: &str = r#"[
    {"id": "hello", "subject": "Hello {{name}}", "body": "Hi {{name}}, greetings to {{company}}.", "variables": ["name", "company"]},
    {"id": "plain", "subject": "News for {{name}}", "body": "Dear {{name}}", "variables": ["name"]}
]"#;

fn fast() -> DispatcherConfig {
    DispatcherConfig {
        sends_per_second: 1000,
        retry_delay: Duration::from_millis(1),
    }
}

fn config() -> BatchProcessingConfig {
    BatchProcessingConfig {
        batch_size: 2,
        delay_between_batches: Duration::ZERO,
        max_retries: 1,
        max_concurrent: 2,
    }
}

async fn import_recipients() -> Vec<Recipient> {
    let report = CsvIngestor::default()
        .ingest_bytes(CONTACTS.as_bytes(), &NoopObserver, &CancellationToken::new())
        .await
        .expect("contacts should import");

    assert_eq!(report.stats.total_rows, 4);
    assert_eq!(report.stats.valid_rows, 2);
    assert_eq!(report.stats.invalid_rows, 2);

    report.valid_rows.iter().map(Recipient::from_row).collect()
}

#[tokio::test]
async fn imported_rows_render_with_sanitized_values() {
    let recipients = import_recipients().await;
    let transport = Arc::new(DryRunTransport::new());
    let store = TemplateStore::from_json(TEMPLATES).expect("templates parse");
    let dispatcher = BatchDispatcher::new(transport.clone(), store, fast());

    let report = dispatcher
        .dispatch(&recipients, "hello", &config(), &CancellationToken::new())
        .await
        .expect("dispatch should run");

    // Bob has no company, so only Alice can be rendered.
    let outbox = transport.outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].to, "alice@example.com");
    assert_eq!(outbox[0].body, "Hi Alice, greetings to &lt;Acme &amp; Co&gt;.");

    assert_eq!(report.summary.sent, 1);
    assert_eq!(report.summary.render_failed, 1);
    assert_eq!(report.batch_sizes, vec![2]);
}

#[tokio::test]
async fn job_run_streams_audit_and_writes_json_lines() {
    let recipients = import_recipients().await;
    let transport = Arc::new(DryRunTransport::new());
    let store = TemplateStore::from_json(TEMPLATES).expect("templates parse");
    let dispatcher = BatchDispatcher::new(transport, store, fast());
    dispatcher.tracker().mark_opt_out("bob@example.com");

    let job = JobManager::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = dispatcher
        .dispatch_job(&job, &recipients, "plain", &config(), AuditLogger::with_subscriber(tx))
        .await
        .expect("dispatch should run");

    let mut streamed = Vec::new();
    while let Some(entry) = rx.recv().await {
        streamed.push(entry);
    }
    assert_eq!(streamed, report.entries);

    let actions: Vec<AuditAction> = report.entries.iter().map(|e| e.action).collect();
    assert_eq!(actions.len(), 2);
    assert!(actions.contains(&AuditAction::EmailSent));
    assert!(actions.contains(&AuditAction::OptedOutSkipped));

    let state = job.get_state().await;
    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.progress.processed, 2);

    let file = tempfile::NamedTempFile::new().expect("temp file");
    write_json_lines(&report.entries, file.reopen().expect("reopen temp file"))
        .expect("audit written");
    let written = std::fs::read_to_string(file.path()).expect("read audit");
    let parsed: Vec<AuditLogEntry> = written
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect();
    assert_eq!(parsed, report.entries);
}
