//! Background indexing pipeline.
//!
//! Domain records are committed by their own flows; making them searchable
//! happens here. Jobs go through a bounded queue into a fixed pool of
//! worker tasks that embed the fragment text and upsert it into the
//! activity store. A failed job is logged and counted, never propagated
//! back to the flow that created the record, and the upsert key
//! (source_kind, source_id) keeps retried or re-enqueued jobs from
//! duplicating fragments.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::core::config::IndexerConfig;
use crate::core::errors::EngineError;
use crate::llm::LlmProvider;
use crate::rag::{ActivityStore, NewActivity};

/// A unit of indexing work.
#[derive(Debug, Clone)]
pub struct IndexJob {
    pub owner: Option<i64>,
    pub source_kind: String,
    pub source_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time snapshot of the pipeline counters.
///
/// Process-local; reset on restart.
#[derive(Debug, Clone, Serialize)]
pub struct IndexerStats {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
}

pub struct BackgroundIndexer {
    tx: mpsc::Sender<IndexJob>,
    counters: Arc<Counters>,
    workers: Vec<JoinHandle<()>>,
}

impl BackgroundIndexer {
    pub fn start(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn ActivityStore>,
        config: &IndexerConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<IndexJob>(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let worker_count = config.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let rx = rx.clone();
            let provider = provider.clone();
            let store = store.clone();
            let counters = counters.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    // Hold the lock only while dequeueing; jobs run unlocked
                    // so workers overlap on the embed and store calls.
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };

                    match run_job(provider.as_ref(), store.as_ref(), &job).await {
                        Ok(record_id) => {
                            counters.completed.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(
                                worker_id,
                                record_id,
                                source_kind = %job.source_kind,
                                "indexed activity"
                            );
                        }
                        Err(err) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                worker_id,
                                source_kind = %job.source_kind,
                                source_id = ?job.source_id,
                                "indexing failed: {}",
                                err
                            );
                        }
                    }
                }
                tracing::debug!(worker_id, "indexing worker stopped");
            }));
        }

        Self {
            tx,
            counters,
            workers,
        }
    }

    /// Queue a job for indexing. Returns immediately.
    ///
    /// `false` means the queue was full and the job was dropped; the drop
    /// shows up in `stats().dropped` and the log. The caller's domain
    /// record stays committed either way, it is just not searchable until
    /// something re-enqueues it.
    pub fn enqueue(&self, job: IndexJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    source_kind = %job.source_kind,
                    source_id = ?job.source_id,
                    "indexing queue full, dropping job"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    source_kind = %job.source_kind,
                    "indexing queue closed, dropping job"
                );
                false
            }
        }
    }

    pub fn stats(&self) -> IndexerStats {
        IndexerStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Close the queue, wait for queued and in-flight jobs to finish, and
    /// return the final counter snapshot.
    pub async fn shutdown(self) -> IndexerStats {
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.await;
        }

        IndexerStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run_job(
    provider: &dyn LlmProvider,
    store: &dyn ActivityStore,
    job: &IndexJob,
) -> Result<i64, EngineError> {
    let embeddings = provider.embed(std::slice::from_ref(&job.text)).await?;
    let Some(embedding) = embeddings.into_iter().next() else {
        return Err(EngineError::EmbeddingService(
            "embedding response was empty".to_string(),
        ));
    };

    let record = store
        .upsert_by_source(
            NewActivity {
                owner: job.owner,
                source_kind: job.source_kind.clone(),
                source_id: job.source_id.clone(),
                text: job.text.clone(),
            },
            embedding,
        )
        .await?;

    Ok(record.id)
}
