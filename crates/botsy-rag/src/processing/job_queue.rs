//! Job queue for background ingestion with progress tracking

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{AbortHandle, AbortRegistration};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::ingestion::{IngestStage, LoadInput};
use crate::types::{BotId, DocumentId, JobId};

/// Job lifecycle, reported by `IngestionQueue::status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing { stage: IngestStage },
    Completed { chunk_count: usize },
    /// Source had no usable text
    Empty,
    Failed { reason_code: String, message: String },
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Processing { .. })
    }

    pub(crate) fn failed(error: &Error) -> Self {
        Self::Failed {
            reason_code: error.reason_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Progress information for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub bot_id: BotId,
    /// Id the document will have once ingested
    pub document_id: DocumentId,
    /// Filename or URL as submitted
    pub source: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned by `submit`; the document id is fixed up front
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionHandle {
    pub job_id: JobId,
    pub document_id: DocumentId,
}

/// A queued ingestion
pub struct IngestionJob {
    pub(crate) id: JobId,
    pub(crate) bot_id: BotId,
    pub(crate) document_id: DocumentId,
    pub(crate) source: LoadInput,
    pub(crate) abort_registration: AbortRegistration,
}

/// Queue statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub empty: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Job queue feeding the ingestion worker
///
/// Finished jobs stay queryable for `retention`, and at most `max_finished`
/// of them are kept; both limits are applied on each submit.
pub struct IngestionQueue {
    jobs: DashMap<JobId, JobProgress>,
    aborts: DashMap<JobId, AbortHandle>,
    sender: mpsc::Sender<IngestionJob>,
    retention: Duration,
    max_finished: usize,
}

impl IngestionQueue {
    /// Create a queue and the receiver its worker drains
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<IngestionJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            jobs: DashMap::new(),
            aborts: DashMap::new(),
            sender,
            retention: Duration::from_secs(3600),
            max_finished: 1000,
        };
        (queue, receiver)
    }

    pub fn with_retention(mut self, retention: Duration, max_finished: usize) -> Self {
        self.retention = retention;
        self.max_finished = max_finished;
        self
    }

    /// Forget finished jobs past retention or beyond the cap, oldest first
    pub fn prune_finished(&self) -> usize {
        self.prune_at(Utc::now())
    }

    fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        let retention = self.retention;
        self.jobs.retain(|_, p| {
            !p.status.is_terminal()
                || (now - p.updated_at)
                    .to_std()
                    .map_or(true, |age| age < retention)
        });

        let mut finished: Vec<(DateTime<Utc>, JobId)> = self
            .jobs
            .iter()
            .filter(|p| p.status.is_terminal())
            .map(|p| (p.updated_at, p.job_id))
            .collect();
        if finished.len() > self.max_finished {
            finished.sort_by_key(|(updated_at, _)| *updated_at);
            let excess = finished.len() - self.max_finished;
            for (_, job_id) in finished.into_iter().take(excess) {
                self.jobs.remove(&job_id);
            }
        }

        let pruned = before.saturating_sub(self.jobs.len());
        if pruned > 0 {
            tracing::debug!("Pruned {} finished ingestion jobs", pruned);
        }
        pruned
    }

    /// Enqueue a source; returns as soon as the job is accepted
    pub async fn submit(&self, bot_id: BotId, source: LoadInput) -> Result<IngestionHandle> {
        self.prune_finished();

        let job_id = JobId::new();
        let document_id = DocumentId::new();
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let now = Utc::now();

        self.jobs.insert(
            job_id,
            JobProgress {
                job_id,
                bot_id,
                document_id,
                source: source.label().to_string(),
                status: JobStatus::Queued,
                created_at: now,
                updated_at: now,
            },
        );
        self.aborts.insert(job_id, abort_handle);

        let job = IngestionJob {
            id: job_id,
            bot_id,
            document_id,
            source,
            abort_registration,
        };

        if let Err(e) = self.sender.send(job).await {
            tracing::error!("Failed to submit job {}: {}", job_id, e);
            let error = Error::internal("ingestion worker is not running");
            self.finish(job_id, JobStatus::failed(&error));
            return Err(error);
        }

        tracing::debug!("Queued job {} for bot {}", job_id, bot_id);
        Ok(IngestionHandle {
            job_id,
            document_id,
        })
    }

    pub fn status(&self, job_id: JobId) -> Option<JobProgress> {
        self.jobs.get(&job_id).map(|p| p.clone())
    }

    /// Jobs for a bot, newest first
    pub fn jobs_for_bot(&self, bot_id: BotId) -> Vec<JobProgress> {
        let mut jobs: Vec<JobProgress> = self
            .jobs
            .iter()
            .filter(|p| p.bot_id == bot_id)
            .map(|p| p.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Cancel a queued or running job; false once it has finished
    pub fn cancel(&self, job_id: JobId) -> bool {
        let Some(mut progress) = self.jobs.get_mut(&job_id) else {
            return false;
        };
        if progress.status.is_terminal() {
            return false;
        }

        progress.status = JobStatus::Cancelled;
        progress.updated_at = Utc::now();
        drop(progress);

        if let Some((_, handle)) = self.aborts.remove(&job_id) {
            handle.abort();
        }
        tracing::info!("Cancelled job {}", job_id);
        true
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for progress in self.jobs.iter() {
            match progress.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing { .. } => stats.processing += 1,
                JobStatus::Completed { .. } => stats.completed += 1,
                JobStatus::Empty => stats.empty += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub(crate) fn mark_processing(&self, job_id: JobId, stage: IngestStage) {
        if let Some(mut progress) = self.jobs.get_mut(&job_id) {
            if !progress.status.is_terminal() {
                progress.status = JobStatus::Processing { stage };
                progress.updated_at = Utc::now();
            }
        }
    }

    /// Record a terminal status unless one is already set
    pub(crate) fn finish(&self, job_id: JobId, status: JobStatus) -> bool {
        self.aborts.remove(&job_id);
        match self.jobs.get_mut(&job_id) {
            Some(mut progress) if !progress.status.is_terminal() => {
                progress.status = status;
                progress.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}
