//! Fan-out of a server's shard and the fan-in aggregation.
//!
//! Every keyword becomes an independent tokio task bounded by a worker
//! semaphore. Each task records its outcome and arrives at a counted barrier;
//! the task that arrives last persists the shard and runs the completion
//! check.

mod barrier;
mod task;

pub use barrier::CountedBarrier;
pub use task::{KeywordTask, TaskPolicy};

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::completion::{CompletionError, CompletionOutcome, CompletionTrigger};
use crate::models::KeywordOutcome;

/// Handle to an in-flight shard.
#[derive(Debug)]
pub struct DispatchHandle {
    pub job_id: i32,
    pub server_id: i32,
    pub dispatched: usize,
    outcome: oneshot::Receiver<Result<CompletionOutcome, String>>,
}

impl DispatchHandle {
    /// Wait for this shard's aggregation to finish.
    pub async fn wait(self) -> anyhow::Result<CompletionOutcome> {
        match self.outcome.await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(anyhow::anyhow!("aggregation failed: {}", e)),
            Err(_) => Err(anyhow::anyhow!("aggregation was dropped")),
        }
    }
}

/// Runs one server's shard to completion.
#[derive(Clone)]
pub struct Dispatcher {
    task: Arc<KeywordTask>,
    trigger: CompletionTrigger,
    workers: usize,
}

impl Dispatcher {
    pub fn new(task: KeywordTask, trigger: CompletionTrigger, workers: usize) -> Self {
        Self {
            task: Arc::new(task),
            trigger,
            workers: workers.max(1),
        }
    }

    pub fn trigger(&self) -> &CompletionTrigger {
        &self.trigger
    }

    /// Spawn one task per keyword id and return immediately.
    pub fn dispatch(&self, job_id: i32, server_id: i32, keyword_ids: Vec<i32>) -> DispatchHandle {
        let (tx, rx) = oneshot::channel();
        let dispatched = keyword_ids.len();
        info!(
            "Server {} dispatching {} keywords for job {} ({} workers)",
            server_id, dispatched, job_id, self.workers
        );

        let join = Arc::new(Join {
            barrier: CountedBarrier::new(dispatched),
            outcomes: Mutex::new(Vec::with_capacity(dispatched)),
            reply: Mutex::new(Some(tx)),
            trigger: self.trigger.clone(),
            policy: self.task.policy().clone(),
            job_id,
            server_id,
        });

        if keyword_ids.is_empty() {
            tokio::spawn(async move { join.finish().await });
        } else {
            let semaphore = Arc::new(Semaphore::new(self.workers));
            for keyword_id in keyword_ids {
                let task = self.task.clone();
                let semaphore = semaphore.clone();
                let join = join.clone();

                tokio::spawn(async move {
                    let outcome = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            // Isolate panics so the barrier still counts this keyword.
                            let runner = task.clone();
                            match tokio::spawn(async move { runner.run(keyword_id).await }).await {
                                Ok(outcome) => outcome,
                                Err(e) => {
                                    error!("Keyword {} task aborted: {}", keyword_id, e);
                                    KeywordOutcome::failed(keyword_id)
                                }
                            }
                        }
                        Err(_) => KeywordOutcome::failed(keyword_id),
                    };
                    join.arrive(outcome).await;
                });
            }
        }

        DispatchHandle {
            job_id,
            server_id,
            dispatched,
            outcome: rx,
        }
    }
}

/// Shared fan-in state for one shard.
struct Join {
    barrier: CountedBarrier,
    outcomes: Mutex<Vec<KeywordOutcome>>,
    reply: Mutex<Option<oneshot::Sender<Result<CompletionOutcome, String>>>>,
    trigger: CompletionTrigger,
    policy: TaskPolicy,
    job_id: i32,
    server_id: i32,
}

impl Join {
    async fn arrive(&self, outcome: KeywordOutcome) {
        self.outcomes.lock().await.push(outcome);
        if self.barrier.arrive() {
            self.finish().await;
        }
    }

    async fn finish(&self) {
        let outcomes = std::mem::take(&mut *self.outcomes.lock().await);
        let result = self.aggregate(&outcomes).await.map_err(|e| e.to_string());

        match &result {
            Ok(outcome) => info!(
                "Server {} job {}: {}",
                self.server_id,
                self.job_id,
                outcome.label()
            ),
            Err(e) => error!(
                "Server {} job {} aggregation failed: {}",
                self.server_id, self.job_id, e
            ),
        }

        if let Some(tx) = self.reply.lock().await.take() {
            let _ = tx.send(result);
        }
    }

    async fn aggregate(
        &self,
        outcomes: &[KeywordOutcome],
    ) -> Result<CompletionOutcome, CompletionError> {
        let attempts = self.policy.aggregate_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self
                .trigger
                .aggregate(self.job_id, self.server_id, outcomes)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Aggregation attempt {}/{} for job {} failed: {}",
                        attempt, attempts, self.job_id, e
                    );
                    tokio::time::sleep(self.policy.aggregate_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
