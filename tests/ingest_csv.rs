use std::io::Write;

use campaign_dispatch::ingest::{
    CsvIngestor, IngestConfig, IngestError, IngestEvent, LogType, NoopObserver,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn write_csv(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp file");
    file
}

#[tokio::test]
async fn mixed_file_splits_valid_and_invalid_rows() {
    let file = write_csv("name,email\nAlice,alice@example.com\n,bob@example.com\n");

    let report = CsvIngestor::default()
        .ingest_path(file.path(), &NoopObserver, &CancellationToken::new())
        .await
        .expect("import should succeed");

    assert_eq!(report.stats.total_rows, 2);
    assert_eq!(report.stats.valid_rows, 1);
    assert_eq!(report.stats.invalid_rows, 1);
    assert_eq!(report.valid_rows[0].name, "Alice");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].to_string(), "Row 2: Missing name");
}

#[tokio::test]
async fn invalid_email_is_reported_by_row() {
    let file = write_csv("name,email,company\nBob,not-an-email,Acme\n");

    let report = CsvIngestor::default()
        .ingest_path(file.path(), &NoopObserver, &CancellationToken::new())
        .await
        .expect("import should succeed");

    assert!(report.valid_rows.is_empty());
    assert_eq!(report.errors[0].row, 1);
    assert!(report.errors[0].reasons[0].starts_with("Invalid email format"));
    assert!(!report.validation().is_valid);
}

#[tokio::test]
async fn missing_email_column_rejects_file() {
    let file = write_csv("name,company\nAlice,Acme\n");

    let err = CsvIngestor::default()
        .ingest_path(file.path(), &NoopObserver, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::HeaderInvalid(_)));
}

#[tokio::test]
async fn oversize_file_is_rejected_before_parsing() {
    let file = write_csv("name,email\nAlice,alice@example.com\n");
    let config = IngestConfig {
        max_file_bytes: 10,
        ..IngestConfig::default()
    };

    let err = CsvIngestor::new(config)
        .ingest_path(file.path(), &NoopObserver, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::FileTooLarge { limit: 10, .. }));
}

#[tokio::test]
async fn cells_are_sanitized_before_they_reach_the_report() {
    let file = write_csv(
        "name,email,company\n\"=SUM(A1:A2)\",carol@example.com,<b>Acme</b>\n",
    );

    let report = CsvIngestor::default()
        .ingest_path(file.path(), &NoopObserver, &CancellationToken::new())
        .await
        .expect("import should succeed");

    let row = &report.valid_rows[0];
    assert_eq!(row.name, "&#x27;=SUM(A1:A2)");
    assert_eq!(row.company.as_deref(), Some("&lt;b&gt;Acme&lt;/b&gt;"));
}

#[tokio::test]
async fn row_cap_returns_partial_report() {
    let file = write_csv(
        "name,email\nA,a@example.com\nB,b@example.com\nC,c@example.com\n",
    );
    let config = IngestConfig {
        max_rows: 2,
        ..IngestConfig::default()
    };

    let err = CsvIngestor::new(config)
        .ingest_path(file.path(), &NoopObserver, &CancellationToken::new())
        .await
        .unwrap_err();

    let partial = err.partial_report().expect("row cap keeps partial rows");
    assert!(matches!(err, IngestError::TooManyRows { limit: 2, .. }));
    assert_eq!(partial.valid_rows.len(), 2);
}

#[tokio::test]
async fn observer_sees_progress_and_row_errors_in_order() {
    let file = write_csv("name,email\nAlice,alice@example.com\n,bob@example.com\n");
    let config = IngestConfig {
        max_rows: 4,
        ..IngestConfig::default()
    };
    let (tx, mut rx) = mpsc::unbounded_channel::<IngestEvent>();

    CsvIngestor::new(config)
        .ingest_path(file.path(), &tx, &CancellationToken::new())
        .await
        .expect("import should succeed");
    drop(tx);

    let mut progress = Vec::new();
    let mut row_errors = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            IngestEvent::Progress(percent) => progress.push(percent),
            IngestEvent::Log(log) if log.log_type == LogType::Error => row_errors.push(log),
            IngestEvent::Log(_) => {}
        }
    }

    assert_eq!(progress, vec![25.0, 50.0]);
    assert_eq!(row_errors.len(), 1);
    assert_eq!(row_errors[0].row_number, Some(2));
}

#[tokio::test]
async fn progress_lines_are_logged_every_log_every_rows() {
    let file = write_csv(
        "name,email\nA,a@example.com\nB,b@example.com\nC,c@example.com\nD,d@example.com\n",
    );
    let config = IngestConfig {
        log_every: 2,
        ..IngestConfig::default()
    };
    let (tx, mut rx) = mpsc::unbounded_channel::<IngestEvent>();

    CsvIngestor::new(config)
        .ingest_path(file.path(), &tx, &CancellationToken::new())
        .await
        .expect("import should succeed");
    drop(tx);

    let mut processed = Vec::new();
    while let Some(event) = rx.recv().await {
        if let IngestEvent::Log(log) = event {
            if log.log_type == LogType::Info && log.message.starts_with("Processed") {
                processed.push((log.message, log.row_number));
            }
        }
    }

    assert_eq!(
        processed,
        vec![
            ("Processed 2 rows".to_string(), Some(2)),
            ("Processed 4 rows".to_string(), Some(4)),
        ]
    );
}
