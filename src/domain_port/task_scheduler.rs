use futures_util::future::BoxFuture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type ScheduledTask = BoxFuture<'static, ()>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    #[error("scheduler is shut down")]
    ShutDown,
    #[error("task rejected: {0}")]
    Rejected(String),
}

/// Handle to a scheduled task. Cancelling before the task starts running
/// guarantees it never runs.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    cancel: CancellationToken,
}

impl TaskHandle {
    pub fn new(id: u64, cancel: CancellationToken) -> Self {
        Self { id, cancel }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[async_trait::async_trait]
pub trait TaskScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> Result<TaskHandle, SchedulingError>;

    fn cancel(&self, handle: &TaskHandle) {
        handle.cancel();
    }

    /// Stops accepting work, drops pending tasks and waits up to `grace` for
    /// running ones before interrupting them.
    async fn shutdown(&self, grace: Duration);
}
