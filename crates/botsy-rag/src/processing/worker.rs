//! Background worker for ingestion jobs

use futures::future::Abortable;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::ProcessingConfig;
use crate::error::Error;
use crate::ingestion::IngestPipeline;
use crate::types::IngestStatus;

use super::job_queue::{IngestionJob, IngestionQueue, JobStatus};

/// Drains the queue, running up to `parallel_documents` jobs at once
pub struct IngestionWorker {
    pipeline: Arc<IngestPipeline>,
    queue: Arc<IngestionQueue>,
    parallel_documents: usize,
    document_timeout: Duration,
}

impl IngestionWorker {
    pub fn new(
        pipeline: Arc<IngestPipeline>,
        queue: Arc<IngestionQueue>,
        config: &ProcessingConfig,
    ) -> Self {
        let parallel_documents = config.workers();
        tracing::info!(
            "Worker configured: {} parallel documents, {}s timeout",
            parallel_documents,
            config.document_timeout_secs
        );

        Self {
            pipeline,
            queue,
            parallel_documents,
            document_timeout: Duration::from_secs(config.document_timeout_secs),
        }
    }

    /// Run on the current runtime until the queue is dropped
    pub fn spawn(self, receiver: mpsc::Receiver<IngestionJob>) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver))
    }

    pub async fn run(self, mut receiver: mpsc::Receiver<IngestionJob>) {
        let semaphore = Arc::new(Semaphore::new(self.parallel_documents));
        let worker = Arc::new(self);

        while let Some(job) = receiver.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let worker = worker.clone();
            tokio::spawn(async move {
                worker.process(job).await;
                drop(permit);
            });
        }

        tracing::info!("Ingestion worker stopped");
    }

    async fn process(&self, job: IngestionJob) {
        let IngestionJob {
            id,
            bot_id,
            document_id,
            source,
            abort_registration,
        } = job;
        let label = source.label().to_string();
        let start = Instant::now();
        tracing::info!("[{}] Job {} started", label, id);

        let queue = self.queue.clone();
        let work = self
            .pipeline
            .ingest_as(bot_id, document_id, source, move |stage| {
                queue.mark_processing(id, stage)
            });

        match Abortable::new(timeout(self.document_timeout, work), abort_registration).await {
            Ok(Ok(Ok(outcome))) => {
                let status = match outcome.status {
                    IngestStatus::Ingested => JobStatus::Completed {
                        chunk_count: outcome.chunk_count,
                    },
                    IngestStatus::Empty => JobStatus::Empty,
                };
                if self.queue.finish(id, status) {
                    tracing::info!(
                        "[{}] Job {} finished in {:.1}s",
                        label,
                        id,
                        start.elapsed().as_secs_f64()
                    );
                } else {
                    // Cancelled after the last write landed
                    self.pipeline.discard(bot_id, document_id, &label).await;
                }
            }
            Ok(Ok(Err(e))) => {
                tracing::error!("[{}] Job {} failed: {}", label, id, e);
                self.queue.finish(id, JobStatus::failed(&e));
            }
            Ok(Err(_)) => {
                let error = Error::Timeout {
                    operation: "document ingestion",
                    secs: self.document_timeout.as_secs(),
                };
                tracing::error!(
                    "[{}] TIMEOUT after {:.1}s (limit: {}s)",
                    label,
                    start.elapsed().as_secs_f64(),
                    self.document_timeout.as_secs()
                );
                self.pipeline.rollback(bot_id, document_id, &label).await;
                self.queue.finish(id, JobStatus::failed(&error));
            }
            Err(_) => {
                tracing::info!("[{}] Job {} aborted", label, id);
                self.pipeline.rollback(bot_id, document_id, &label).await;
                self.queue.finish(id, JobStatus::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::ingestion::pipeline::tests::Fixture;
    use crate::ingestion::{IngestStage, LoadInput};
    use crate::providers::EmbeddingProvider;
    use crate::providers::VectorStore;
    use crate::types::JobId;
    use async_trait::async_trait;

    /// Never finishes an embedding call
    struct StalledEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StalledEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            std::future::pending().await
        }
        fn dimensions(&self) -> usize {
            128
        }
        fn model_id(&self) -> String {
            "stalled".into()
        }
        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
        fn name(&self) -> &str {
            "stalled"
        }
    }

    fn start(fx: &Fixture, pipeline: IngestPipeline) -> Arc<IngestionQueue> {
        let (queue, receiver) = IngestionQueue::new(16);
        let queue = Arc::new(queue);
        IngestionWorker::new(Arc::new(pipeline), queue.clone(), &fx.config.processing)
            .spawn(receiver);
        queue
    }

    async fn wait_until<F>(queue: &IngestionQueue, job_id: JobId, done: F) -> JobStatus
    where
        F: Fn(&JobStatus) -> bool,
    {
        for _ in 0..500 {
            if let Some(progress) = queue.status(job_id) {
                if done(&progress.status) {
                    return progress.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not reach the expected state", job_id);
    }

    #[tokio::test]
    async fn test_jobs_complete_empty_and_fail() {
        let fx = Fixture::new();
        let queue = start(&fx, fx.pipeline());

        let ok = queue
            .submit(fx.bot_id, LoadInput::file("refunds.txt", "Our refund window is 30 days."))
            .await
            .unwrap();
        let empty = queue
            .submit(fx.bot_id, LoadInput::file("blank.txt", "   "))
            .await
            .unwrap();
        let bad = queue
            .submit(fx.bot_id, LoadInput::file("data.bin", vec![0u8, 159, 146, 150]))
            .await
            .unwrap();

        let status = wait_until(&queue, ok.job_id, JobStatus::is_terminal).await;
        assert_eq!(status, JobStatus::Completed { chunk_count: 1 });
        assert!(fx.catalog.document(fx.bot_id, ok.document_id).is_ok());

        let status = wait_until(&queue, empty.job_id, JobStatus::is_terminal).await;
        assert_eq!(status, JobStatus::Empty);

        let status = wait_until(&queue, bad.job_id, JobStatus::is_terminal).await;
        assert!(
            matches!(status, JobStatus::Failed { ref reason_code, .. } if reason_code == "unsupported_format")
        );
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let mut fx = Fixture::new();
        fx.config.embeddings.timeout_secs = 3600;
        let pipeline = IngestPipeline::new(
            &fx.config,
            Arc::new(StalledEmbedder),
            fx.store.clone(),
            fx.catalog.clone(),
        )
        .unwrap();
        let queue = start(&fx, pipeline);

        let handle = queue
            .submit(fx.bot_id, LoadInput::file("a.txt", "Text that never gets embedded."))
            .await
            .unwrap();
        wait_until(&queue, handle.job_id, |s| {
            *s == JobStatus::Processing {
                stage: IngestStage::Embedding,
            }
        })
        .await;

        assert!(queue.cancel(handle.job_id));
        assert_eq!(queue.status(handle.job_id).unwrap().status, JobStatus::Cancelled);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.store.count(fx.bot_id).await.unwrap(), 0);
        assert!(fx.catalog.documents_for_bot(fx.bot_id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_timeout_fails_job() {
        let mut fx = Fixture::new();
        fx.config.embeddings.timeout_secs = 3600;
        fx.config.processing.document_timeout_secs = 1;
        let pipeline = IngestPipeline::new(
            &fx.config,
            Arc::new(StalledEmbedder),
            fx.store.clone(),
            fx.catalog.clone(),
        )
        .unwrap();
        let queue = start(&fx, pipeline);

        let handle = queue
            .submit(fx.bot_id, LoadInput::file("a.txt", "Text that never gets embedded."))
            .await
            .unwrap();

        let status = wait_until(&queue, handle.job_id, JobStatus::is_terminal).await;
        assert!(matches!(status, JobStatus::Failed { ref reason_code, .. } if reason_code == "timeout"));
    }
}
