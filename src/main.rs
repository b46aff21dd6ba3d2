use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use campaign_dispatch::dispatch::{
    AuditLogger, BatchDispatcher, BatchProcessingConfig, DispatcherConfig, DryRunTransport,
    JobManager, JobStatus, TemplateStore, count_by_status, write_json_lines,
};
use campaign_dispatch::ingest::{CsvIngestor, IngestConfig, IngestError, IngestEvent, IngestReport};
use campaign_dispatch::models::{AuditLogEntry, Recipient};

#[derive(Parser, Debug)]
#[command(name = "campaign", about = "Validate contact lists and send email campaigns")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sanitize and validate a contact CSV, printing the report as JSON.
    Validate {
        /// Contact CSV with `name` and `email` columns.
        file: PathBuf,
    },
    /// Import a contact CSV and send a template to every valid row.
    ///
    /// Delivery goes through the dry-run transport: messages are logged, not sent.
    Send {
        file: PathBuf,

        /// JSON array of templates (`id`, `subject`, `body`, `variables`).
        #[arg(long)]
        templates: PathBuf,

        /// Id of the template to send.
        #[arg(long)]
        template: String,

        /// Address that has opted out. May be repeated.
        #[arg(long = "opt-out")]
        opt_out: Vec<String>,

        /// Write the audit trail here as JSON lines.
        #[arg(long)]
        audit_out: Option<PathBuf>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        max_concurrent: Option<usize>,

        #[arg(long)]
        max_retries: Option<u32>,

        #[arg(long)]
        batch_delay_ms: Option<u64>,

        /// Sends per second across the whole run.
        #[arg(long)]
        rate: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    campaign_dispatch::init_logger();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { file } => validate(&file).await,
        Command::Send {
            file,
            templates,
            template,
            opt_out,
            audit_out,
            batch_size,
            max_concurrent,
            max_retries,
            batch_delay_ms,
            rate,
        } => {
            let mut batch_config = BatchProcessingConfig::from_env();
            if let Some(size) = batch_size {
                batch_config.batch_size = size;
            }
            if let Some(limit) = max_concurrent {
                batch_config.max_concurrent = limit;
            }
            if let Some(retries) = max_retries {
                batch_config.max_retries = retries;
            }
            if let Some(ms) = batch_delay_ms {
                batch_config.delay_between_batches = Duration::from_millis(ms);
            }

            let mut dispatcher_config = DispatcherConfig::from_env();
            if let Some(rate) = rate {
                dispatcher_config.sends_per_second = rate.max(1);
            }

            send(SendArgs {
                file,
                templates,
                template,
                opt_out,
                audit_out,
                batch_config,
                dispatcher_config,
            })
            .await
        }
    }
}

async fn validate(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let job = JobManager::new();
    spawn_ctrl_c(job.clone());

    let report = import(file, &job).await?;
    job.complete_job().await;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &report)?;
    writeln!(out)?;
    Ok(())
}

struct SendArgs {
    file: PathBuf,
    templates: PathBuf,
    template: String,
    opt_out: Vec<String>,
    audit_out: Option<PathBuf>,
    batch_config: BatchProcessingConfig,
    dispatcher_config: DispatcherConfig,
}

async fn send(args: SendArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = TemplateStore::load(&args.templates)?;

    let job = JobManager::new();
    spawn_ctrl_c(job.clone());

    let report = import(&args.file, &job).await?;
    job.complete_job().await;
    for error in &report.errors {
        log::warn!("skipping {}", error);
    }

    let recipients: Vec<Recipient> = report.valid_rows.iter().map(Recipient::from_row).collect();
    if recipients.is_empty() {
        log::warn!("no valid rows in {}, nothing to send", args.file.display());
        return Ok(());
    }

    let transport = Arc::new(DryRunTransport::new());
    let dispatcher = BatchDispatcher::new(transport, store, args.dispatcher_config);
    for address in &args.opt_out {
        dispatcher.tracker().mark_opt_out(address);
    }

    // Stream entries to the log as they happen; the full trail is in the report.
    let (tx, mut rx) = mpsc::unbounded_channel::<AuditLogEntry>();
    let audit_stream = tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            log::debug!("audit: {} {} ({})", entry.action, entry.email, entry.details);
        }
    });

    let dispatched = dispatcher
        .dispatch_job(
            &job,
            &recipients,
            &args.template,
            &args.batch_config,
            AuditLogger::with_subscriber(tx),
        )
        .await?;
    let _ = audit_stream.await;

    let (ok, failed) = count_by_status(&dispatched.entries);
    log::info!("dispatch {}: audit has {} ok and {} error entries", dispatched.run_id, ok, failed);

    if let Some(path) = &args.audit_out {
        let out = BufWriter::new(File::create(path)?);
        write_json_lines(&dispatched.entries, out)?;
        log::info!("wrote {} audit entries to {}", dispatched.entries.len(), path.display());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &dispatched.summary)?;
    writeln!(out)?;

    if dispatched.cancelled {
        return Err("dispatch cancelled".into());
    }
    Ok(())
}

async fn import(file: &Path, job: &JobManager) -> Result<IngestReport, Box<dyn std::error::Error>> {
    job.start_job(JobStatus::Importing, None).await?;

    let ingestor = CsvIngestor::new(IngestConfig::from_env());
    let (tx, mut rx) = mpsc::unbounded_channel::<IngestEvent>();
    let progress = tokio::spawn(async move {
        let mut last_logged = 0.0;
        while let Some(event) = rx.recv().await {
            if let IngestEvent::Progress(percent) = event {
                if percent - last_logged >= 10.0 {
                    log::debug!("import: {:.0}% of row cap", percent);
                    last_logged = percent;
                }
            }
        }
    });

    let result = ingestor.ingest_path(file, &tx, &job.token()).await;
    drop(tx);
    let _ = progress.await;

    match result {
        Ok(report) => Ok(report),
        Err(e) => {
            if let IngestError::TooManyRows { partial, .. } | IngestError::Cancelled { partial } = &e {
                log::warn!("import stopped with {} valid rows read", partial.stats.valid_rows);
            }
            if matches!(e, IngestError::Cancelled { .. }) {
                job.cancel_job().await;
            } else {
                job.fail_job(e.to_string()).await;
            }
            Err(e.into())
        }
    }
}

fn spawn_ctrl_c(job: JobManager) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, cancelling");
            job.cancel_job().await;
        }
    });
}
