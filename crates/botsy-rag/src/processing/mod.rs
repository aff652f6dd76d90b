//! Background ingestion with job queue and progress tracking

mod job_queue;
mod worker;

pub use job_queue::{
    IngestionHandle, IngestionJob, IngestionQueue, JobProgress, JobStatus, QueueStats,
};
pub use worker::IngestionWorker;
