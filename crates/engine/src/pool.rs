//! Bounded pool for lifecycle work accepted by the HTTP layer.
//!
//! Submissions go into a bounded queue; a full queue is refused rather than
//! buffered. A dispatcher task hands queued jobs to workers as semaphore
//! permits free up. Each job gets a child of the pool's cancellation token.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chalops_core::error::{CoreError, CoreResult};
use futures::future::BoxFuture;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

type JobFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send>;

struct QueuedJob {
    job_id: String,
    run: JobFn,
}

pub struct JobPool {
    sender: mpsc::Sender<QueuedJob>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl JobPool {
    /// Start a pool running at most `workers` jobs with up to `queue` more
    /// waiting. Must be called within a Tokio runtime.
    pub fn start(workers: usize, queue: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue.max(1));
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let permits = Arc::new(Semaphore::new(workers.max(1)));

        let dispatcher = tokio::spawn(dispatch_loop(
            receiver,
            permits,
            tracker.clone(),
            cancel.clone(),
        ));
        tracing::info!(workers, queue, "Job pool started");

        Self {
            sender,
            cancel,
            tracker,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Queue a job. Fails with `Unavailable` when the queue is full or the
    /// pool is shutting down; the job is not run in that case.
    pub fn submit<F, Fut>(&self, job_id: &str, job: F) -> CoreResult<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Unavailable("job pool is shutting down".into()));
        }
        let queued = QueuedJob {
            job_id: job_id.to_string(),
            run: Box::new(move |token| Box::pin(job(token))),
        };
        self.sender.try_send(queued).map_err(|e| match e {
            TrySendError::Full(job) => {
                tracing::warn!(job_id = %job.job_id, "Job queue full, submission refused");
                CoreError::Unavailable("job queue is full".into())
            }
            TrySendError::Closed(_) => CoreError::Unavailable("job pool is shutting down".into()),
        })
    }

    /// Jobs currently running.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel running jobs, run queued ones with a cancelled token so they
    /// can record their outcome, and wait up to `timeout` for all of them.
    /// Returns `false` if the timeout elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        let dispatcher = self.dispatcher.lock().ok().and_then(|mut d| d.take());
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Job pool dispatcher panicked");
            }
        }
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok();
        if drained {
            tracing::info!("Job pool drained");
        } else {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Job pool shutdown timed out with jobs still running",
            );
        }
        drained
    }
}

async fn dispatch_loop(
    mut receiver: mpsc::Receiver<QueuedJob>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let token = cancel.child_token();
        tracing::debug!(job_id = %job.job_id, "Job started");
        tracker.spawn(async move {
            let _permit = permit;
            (job.run)(token).await;
        });
    }

    receiver.close();
    while let Some(job) = receiver.recv().await {
        tracing::debug!(job_id = %job.job_id, "Running queued job with cancelled token");
        tracker.spawn((job.run)(cancel.child_token()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn runs_submitted_jobs() {
        let pool = JobPool::start(2, 4);
        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            let done = done.clone();
            pool.submit(&format!("j{i}"), move |_| async move {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pool.shutdown(Duration::from_secs(1)).await);
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn full_queue_is_refused() {
        let pool = JobPool::start(1, 1);
        let gate = CancellationToken::new();

        // Occupies the only worker.
        let g = gate.clone();
        pool.submit("busy", move |_| async move { g.cancelled().await }).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Fills the queue.
        let g = gate.clone();
        pool.submit("queued", move |_| async move { g.cancelled().await }).unwrap();

        let refused = pool.submit("overflow", |_| async {});
        assert_matches!(refused, Err(CoreError::Unavailable(_)));

        gate.cancel();
        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn shutdown_cancels_running_jobs() {
        let pool = JobPool::start(1, 1);
        let saw_cancel = Arc::new(AtomicUsize::new(0));
        let flag = saw_cancel.clone();
        pool.submit("long", move |token| async move {
            token.cancelled().await;
            flag.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(pool.shutdown(Duration::from_secs(1)).await);
        assert_eq!(saw_cancel.load(Ordering::SeqCst), 1);
        assert_matches!(pool.submit("late", |_| async {}), Err(CoreError::Unavailable(_)));
    }
}
