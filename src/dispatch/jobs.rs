use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Importing,
    Sending,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Importing | JobStatus::Sending)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub current_step: String,
    pub processed: usize,
    pub total: Option<usize>,
    pub batches_completed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub id: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Idle,
            progress: JobProgress::default(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// Handle on one long-running import or send job.
///
/// Shares its state with whoever runs the job and carries the cancellation
/// token the job's loops and waits listen on.
#[derive(Clone)]
pub struct JobManager {
    pub state: Arc<Mutex<JobState>>,
    pub cancellation_token: CancellationToken,
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(JobState::default())),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub async fn get_state(&self) -> JobState {
        self.state.lock().await.clone()
    }

    pub async fn start_job(&self, status: JobStatus, total: Option<usize>) -> Result<String, String> {
        let mut state = self.state.lock().await;

        if state.status.is_running() {
            return Err("A job is already running".to_string());
        }
        if self.cancellation_token.is_cancelled() {
            return Err("Job manager has been cancelled".to_string());
        }

        let job_id = Uuid::new_v4().to_string();
        *state = JobState {
            id: job_id.clone(),
            status,
            progress: JobProgress {
                current_step: "Starting...".to_string(),
                total,
                ..JobProgress::default()
            },
            started_at: Some(Utc::now()),
            completed_at: None,
            error_message: None,
        };

        Ok(job_id)
    }

    pub async fn update_status(&self, status: JobStatus, step: String) {
        let mut state = self.state.lock().await;
        state.status = status;
        state.progress.current_step = step;
    }

    /// Record a finished batch and the recipients it settled.
    pub async fn batch_completed(&self, settled: usize) {
        let mut state = self.state.lock().await;
        state.progress.batches_completed += 1;
        state.progress.processed += settled;
    }

    pub async fn add_error(&self, error: String) {
        let mut state = self.state.lock().await;
        state.progress.errors.push(error);
    }

    pub async fn complete_job(&self) {
        let mut state = self.state.lock().await;
        state.status = JobStatus::Completed;
        state.completed_at = Some(Utc::now());
    }

    /// End the job with an error. A job whose token has already fired stays
    /// `Cancelled`; the error is still recorded.
    pub async fn fail_job(&self, error: String) {
        let mut state = self.state.lock().await;
        if !self.cancellation_token.is_cancelled() {
            state.status = JobStatus::Error;
        }
        state.error_message = Some(error);
        state.completed_at = Some(Utc::now());
    }

    pub async fn cancel_job(&self) {
        self.cancellation_token.cancel();
        let mut state = self.state.lock().await;
        state.status = JobStatus::Cancelled;
        state.completed_at = Some(Utc::now());
    }

    pub fn token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}
