//! Supervised dispatch workers with graceful shutdown.
//!
//! Each worker repeatedly claims a batch of queued jobs through the
//! [`Dispatcher`] and sleeps for the poll interval when the queue is empty.

use std::{sync::Arc, time::Duration};

use consentry_core::Clock;
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    dispatcher::Dispatcher,
    error::{Result, WebhookError},
};

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Counters shared by all workers of a pool.
#[derive(Debug, Default, Clone)]
pub struct DispatchStats {
    /// Number of running workers.
    pub active_workers: usize,
    /// Jobs claimed since startup.
    pub jobs_claimed: u64,
    /// Batches that failed to claim.
    pub batch_failures: u64,
}

/// Pool of dispatch workers.
pub struct WorkerPool {
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<DispatchStats>>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<Result<()>>>,
}

impl WorkerPool {
    /// Creates a pool. No workers run until [`WorkerPool::spawn_workers`].
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            clock,
            stats: Arc::new(RwLock::new(DispatchStats::default())),
            cancellation_token,
            worker_handles: Vec::new(),
        }
    }

    /// Shared worker counters.
    pub fn stats(&self) -> Arc<RwLock<DispatchStats>> {
        self.stats.clone()
    }

    /// Spawns the configured number of workers.
    ///
    /// Workers run until the cancellation token fires.
    pub async fn spawn_workers(&mut self) {
        let worker_count = self.dispatcher.config().worker_count;
        info!(worker_count, "spawning dispatch workers");

        self.stats.write().await.active_workers = worker_count;

        for worker_id in 0..worker_count {
            let worker = DispatchWorker {
                id: worker_id,
                dispatcher: self.dispatcher.clone(),
                clock: self.clock.clone(),
                stats: self.stats.clone(),
                cancellation_token: self.cancellation_token.clone(),
            };

            let handle = tokio::spawn(async move {
                let result = worker.run().await;
                if let Err(ref error) = result {
                    error!(worker_id, error = %error, "dispatch worker terminated with error");
                } else {
                    info!(worker_id, "dispatch worker stopped gracefully");
                }
                result
            });

            self.worker_handles.push(handle);
        }

        info!(spawned_workers = self.worker_handles.len(), "all dispatch workers spawned");
    }

    /// Cancels all workers and waits for in-flight jobs to finish.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::ShutdownTimeout` if the workers do not stop
    /// within `timeout`.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_seconds = timeout.as_secs(),
            "initiating graceful worker shutdown"
        );

        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut self.worker_handles);
        let stats = self.stats.clone();
        let shutdown_future = async move {
            let mut panics = Vec::new();

            for (worker_id, handle) in handles.into_iter().enumerate() {
                match handle.await {
                    Ok(Ok(())) => {},
                    Ok(Err(error)) => {
                        warn!(worker_id, error = %error, "worker completed with error during shutdown");
                    },
                    Err(join_error) => {
                        error!(worker_id, error = %join_error, "worker task panicked during shutdown");
                        panics.push(WebhookError::WorkerPanic {
                            worker_id,
                            error: join_error.to_string(),
                        });
                    },
                }
            }

            stats.write().await.active_workers = 0;
            panics
        };

        match tokio::time::timeout(timeout, shutdown_future).await {
            Ok(panics) => {
                if !panics.is_empty() {
                    warn!(panicked = panics.len(), "some workers panicked during shutdown");
                }
                info!("worker pool shutdown completed");
                Ok(())
            },
            Err(_elapsed) => {
                error!(
                    timeout_seconds = timeout.as_secs(),
                    "worker shutdown timed out, some workers may still be running"
                );
                Err(WebhookError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Returns true if any worker is still running.
    pub fn has_active_workers(&self) -> bool {
        self.worker_handles.iter().any(|h| !h.is_finished())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active_count = self.worker_handles.iter().filter(|h| !h.is_finished()).count();

        if active_count > 0 && !self.cancellation_token.is_cancelled() {
            error!(
                active_workers = active_count,
                "WorkerPool dropped with active workers, forcing cancellation"
            );
            self.cancellation_token.cancel();
            warn!("call shutdown_graceful() before dropping the pool to finish in-flight jobs");
        }
    }
}

struct DispatchWorker {
    id: usize,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<DispatchStats>>,
    cancellation_token: CancellationToken,
}

impl DispatchWorker {
    async fn run(&self) -> Result<()> {
        info!(worker_id = self.id, "dispatch worker starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.dispatcher.process_pending().await {
                Ok(claimed) => {
                    if claimed > 0 {
                        debug!(worker_id = self.id, claimed, "processed job batch");
                        self.stats.write().await.jobs_claimed += claimed as u64;
                        continue;
                    }
                    tokio::select! {
                        () = self.clock.sleep(self.dispatcher.config().poll_interval) => {}
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
                Err(error) => {
                    error!(worker_id = self.id, error = %error, "claiming dispatch jobs failed");
                    self.stats.write().await.batch_failures += 1;
                    tokio::select! {
                        () = self.clock.sleep(ERROR_BACKOFF) => {}
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
            }
        }

        info!(worker_id = self.id, "dispatch worker stopped");
        Ok(())
    }
}
