use crate::domain_port::{ScheduledTask, SchedulingError, TaskHandle, TaskScheduler};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Timer tasks on the tokio runtime. At most `workers` tasks run their body
/// at the same time; the rest wait for a permit after their delay elapses.
pub struct TokioTaskScheduler {
    permits: Arc<Semaphore>,
    pending: CancellationToken,
    interrupt: CancellationToken,
    tracker: TaskTracker,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl TokioTaskScheduler {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            pending: CancellationToken::new(),
            interrupt: CancellationToken::new(),
            tracker: TaskTracker::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Tasks spawned and not yet finished, pending or running.
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }
}

#[async_trait::async_trait]
impl TaskScheduler for TokioTaskScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> Result<TaskHandle, SchedulingError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulingError::ShutDown);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SchedulingError::Rejected(e.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.pending.child_token();
        let permits = self.permits.clone();
        let interrupt = self.interrupt.clone();
        let task_cancel = cancel.clone();

        self.tracker.spawn_on(
            async move {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                let _permit = tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => return,
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                if task_cancel.is_cancelled() {
                    return;
                }
                tokio::select! {
                    biased;
                    _ = interrupt.cancelled() => {
                        tracing::warn!(task = id, "task interrupted by shutdown");
                    }
                    _ = task => {}
                }
            },
            &runtime,
        );

        Ok(TaskHandle::new(id, cancel))
    }

    async fn shutdown(&self, grace: Duration) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(tasks = self.tracker.len(), "scheduler shutting down...");
        self.pending.cancel();
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                tasks = self.tracker.len(),
                "grace period elapsed, interrupting running tasks"
            );
            self.interrupt.cancel();
            self.tracker.wait().await;
        }
        self.permits.close();
        tracing::info!("scheduler shut down");
    }
}
